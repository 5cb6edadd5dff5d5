use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::document::Document;
use crate::error::StorageError;

/// File name of the live document inside the data directory.
pub const DOCUMENT_FILE: &str = "app_data.json";

/// What a load found on disk.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Document),
    /// Nothing has been saved yet.
    Missing,
    /// The stored content could not be read or parsed.
    Unreadable(StorageError),
}

impl LoadOutcome {
    /// Collapse the outcome into a document, treating anything unreadable as
    /// "no prior data".
    pub fn into_document(self) -> Document {
        match self {
            LoadOutcome::Loaded(doc) => doc,
            LoadOutcome::Missing => Document::new(),
            LoadOutcome::Unreadable(e) => {
                warn!("Stored document unreadable, starting from empty: {}", e);
                Document::new()
            }
        }
    }
}

/// Durable home of the single shared document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the backend identifier (e.g., "local").
    fn backend_name(&self) -> &'static str;

    /// Load the last saved document.
    async fn load(&self) -> LoadOutcome;

    /// Raw bytes of the persisted document, exactly as stored.
    async fn load_raw(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the persisted document. A concurrent `load` sees either the
    /// old or the new content, never a mix.
    async fn save(&self, doc: &Document) -> Result<(), StorageError>;
}

/// Document store backed by one JSON file.
///
/// ```text
/// {data_dir}/
///   app_data.json
///   app_data.json.tmp   (only while a save is in flight)
/// ```
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    data_dir: PathBuf,
}

impl LocalDocumentStore {
    /// Open the store, creating the data directory if needed.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let store = Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        };
        store.ensure_data_dir().await?;
        Ok(store)
    }

    /// Path of the live document file.
    pub fn document_path(&self) -> PathBuf {
        self.data_dir.join(DOCUMENT_FILE)
    }

    async fn ensure_data_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.data_dir).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to create data dir {}: {}",
                self.data_dir.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), level = "debug")]
    async fn load(&self) -> LoadOutcome {
        let bytes = match self.load_raw().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return LoadOutcome::Missing,
            Err(e) => return LoadOutcome::Unreadable(e),
        };

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                return LoadOutcome::Unreadable(StorageError::Serialization(format!(
                    "Failed to parse {}: {}",
                    self.document_path().display(),
                    e
                )))
            }
        };

        match Document::from_value(value) {
            Some(doc) => {
                debug!("Loaded document with {} keys", doc.len());
                LoadOutcome::Loaded(doc)
            }
            None => LoadOutcome::Unreadable(StorageError::Serialization(
                "Stored document is not a JSON object".to_string(),
            )),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn load_raw(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.document_path();
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, doc), level = "debug", fields(keys = doc.len()))]
    async fn save(&self, doc: &Document) -> Result<(), StorageError> {
        self.ensure_data_dir().await?;
        let path = self.document_path();

        let json = serde_json::to_vec_pretty(doc).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize document: {}", e))
        })?;

        // Write atomically via temp file
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json).await.map_err(|e| {
            StorageError::Io(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            StorageError::Io(format!("Failed to rename to {}: {}", path.display(), e))
        })?;

        debug!("Saved document ({} bytes)", json.len());
        Ok(())
    }
}
