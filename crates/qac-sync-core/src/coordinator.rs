//! The sync transaction: authenticate, then backup, load, merge and save
//! under one lock.
//!
//! Every sync runs the whole sequence while holding the coordinator's
//! mutex, so two devices syncing at once cannot interleave their load and
//! save steps and drop each other's updates. The store's atomic rename
//! only protects readers from torn files; it does not replace the lock.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backup::{BackupInfo, BackupManager, BackupOutcome};
use crate::config::SyncConfig;
use crate::document::{Document, MergePolicy};
use crate::error::{Result, StorageError, SyncError};
use crate::merge::merge;
use crate::store::{DocumentStore, LocalDocumentStore};

/// The only action the sync endpoint accepts.
const SYNC_ACTION: &str = "sync";

/// Wire shape of a sync request body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    client_time: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
}

/// A validated sync request.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub document: Document,
    pub client_time: Option<String>,
    pub device_id: Option<String>,
}

impl SyncRequest {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            client_time: None,
            device_id: None,
        }
    }

    /// Parse a request body. `action` may be omitted; `data` must be an
    /// object.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let payload: SyncPayload = serde_json::from_slice(body)
            .map_err(|e| SyncError::MalformedRequest(format!("Invalid JSON body: {}", e)))?;

        if let Some(action) = payload.action {
            if action != SYNC_ACTION {
                return Err(SyncError::UnsupportedAction(action));
            }
        }

        let data = payload
            .data
            .ok_or_else(|| SyncError::MalformedRequest("Missing data field".to_string()))?;
        let document = Document::from_value(data).ok_or_else(|| {
            SyncError::MalformedRequest("Data field must be a JSON object".to_string())
        })?;

        Ok(Self {
            document,
            client_time: payload.client_time,
            device_id: payload.device_id,
        })
    }
}

/// Response returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<String>,
    /// The server-held protected credential, echoed so clients can adopt it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Whether this request rewrote the stored document.
    #[serde(skip)]
    pub changed: bool,
}

impl SyncResult {
    /// A declined or failed request.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            server_time: None,
            credential: None,
            changed: false,
        }
    }

    fn success(message: &str, document: Document, policy: &MergePolicy, changed: bool) -> Self {
        let credential = policy.credential_in(&document).map(str::to_string);
        Self {
            success: true,
            message: message.to_string(),
            data: Some(document),
            server_time: Some(chrono::Utc::now().to_rfc3339()),
            credential,
            changed,
        }
    }
}

/// Serializes all access to the shared document.
pub struct SyncCoordinator {
    credential_digest: Vec<u8>,
    policy: MergePolicy,
    store: Arc<dyn DocumentStore>,
    backups: BackupManager,
    lock: Mutex<()>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("policy", &self.policy)
            .field("store", &self.store.backend_name())
            .field("backups", &self.backups)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Create a coordinator over an existing store.
    pub fn new(config: &SyncConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            credential_digest: digest(&config.sync_password),
            policy: config.policy.clone(),
            store,
            backups: BackupManager::new(&config.backup_dir, config.backup_retention),
            lock: Mutex::new(()),
        }
    }

    /// Open the local file store and backup directory named by `config`.
    pub async fn open(config: &SyncConfig) -> std::result::Result<Self, StorageError> {
        let store = LocalDocumentStore::open(&config.data_dir).await?;
        let coordinator = Self::new(config, Arc::new(store));
        coordinator.backups.ensure_dir().await?;
        Ok(coordinator)
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn backup_dir(&self) -> &Path {
        self.backups.backup_dir()
    }

    /// Check a caller's credential against the configured secret.
    ///
    /// Both sides are hashed first so the comparison time does not depend
    /// on how much of the secret was guessed.
    pub fn authenticate(&self, credential: &str) -> Result<()> {
        if digest(credential) == self.credential_digest {
            Ok(())
        } else {
            warn!("Sync credential rejected");
            Err(SyncError::Unauthorized)
        }
    }

    /// Handle one sync request body.
    pub async fn sync(&self, credential: &str, body: &[u8]) -> Result<SyncResult> {
        self.authenticate(credential)?;
        let request = SyncRequest::parse(body)?;
        self.run(request).await
    }

    /// Handle an already parsed sync request.
    pub async fn sync_request(&self, credential: &str, request: SyncRequest) -> Result<SyncResult> {
        self.authenticate(credential)?;
        self.run(request).await
    }

    /// Current document without merging anything into it.
    pub async fn fetch(&self, credential: &str) -> Result<SyncResult> {
        self.authenticate(credential)?;
        let document = {
            let _guard = self.lock.lock().await;
            self.store.load().await.into_document()
        };
        Ok(SyncResult::success("Fetched", document, &self.policy, false))
    }

    /// Daily backups currently on disk, oldest first.
    pub async fn list_backups(&self, credential: &str) -> Result<Vec<BackupInfo>> {
        self.authenticate(credential)?;
        Ok(self.backups.list_backups().await?)
    }

    async fn run(&self, request: SyncRequest) -> Result<SyncResult> {
        info!(
            "Sync from device {} (client time {}, {} keys)",
            request.device_id.as_deref().unwrap_or("unknown"),
            request.client_time.as_deref().unwrap_or("-"),
            request.document.len()
        );

        let _guard = self.lock.lock().await;

        match self.backups.backup_if_due(self.store.as_ref()).await {
            Ok(BackupOutcome::Created(path)) => debug!("Daily backup written to {}", path.display()),
            Ok(_) => {}
            Err(e) => warn!("Backup failed, continuing with sync: {}", e),
        }

        let server = self.store.load().await.into_document();
        let result = merge(&server, &request.document, &self.policy);

        let changed = result.changed();
        if changed {
            self.store.save(&result.document).await?;
            info!("Document updated: {}", result.changed_keys.join(", "));
        } else {
            debug!("No changes to persist");
        }

        let message = if changed {
            "Sync succeeded"
        } else {
            "Sync succeeded, no changes"
        };
        Ok(SyncResult::success(message, result.document, &self.policy, changed))
    }
}

fn digest(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}
