//! Daily snapshots of the persisted document.
//!
//! ```text
//! {backup_dir}/
//!   backup_20240101.json
//!   backup_20240102.json
//! ```
//!
//! At most one file exists per local calendar day. A snapshot is the stored
//! bytes copied verbatim; it is written to a temp file and renamed so a
//! partial copy never counts as the day's backup.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::StorageError;
use crate::store::DocumentStore;

const BACKUP_PREFIX: &str = "backup_";
const BACKUP_SUFFIX: &str = ".json";
const DAY_FORMAT: &str = "%Y%m%d";

/// Result of a backup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(PathBuf),
    /// Today's backup was already taken.
    AlreadyExists(PathBuf),
    /// Nothing has been persisted yet.
    NothingToBackup,
}

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub name: String,
    pub day: NaiveDate,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    /// Number of daily backups to keep; `None` keeps all of them.
    retention: Option<NonZeroUsize>,
}

impl BackupManager {
    pub fn new(backup_dir: impl AsRef<Path>, retention: Option<NonZeroUsize>) -> Self {
        Self {
            backup_dir: backup_dir.as_ref().to_path_buf(),
            retention,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Create the backup directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.backup_dir).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to create backup dir {}: {}",
                self.backup_dir.display(),
                e
            ))
        })
    }

    /// Path of the backup for `day`.
    pub fn backup_path(&self, day: NaiveDate) -> PathBuf {
        self.backup_dir.join(format!(
            "{}{}{}",
            BACKUP_PREFIX,
            day.format(DAY_FORMAT),
            BACKUP_SUFFIX
        ))
    }

    /// Snapshot the store unless today's backup already exists.
    pub async fn backup_if_due(
        &self,
        store: &dyn DocumentStore,
    ) -> Result<BackupOutcome, StorageError> {
        self.backup_for_day(store, Local::now().date_naive()).await
    }

    /// Snapshot the store as the backup for `day`, unless one exists.
    #[instrument(skip(self, store), level = "debug")]
    pub async fn backup_for_day(
        &self,
        store: &dyn DocumentStore,
        day: NaiveDate,
    ) -> Result<BackupOutcome, StorageError> {
        let path = self.backup_path(day);
        let exists = fs::try_exists(&path).await.map_err(|e| {
            StorageError::Io(format!("Failed to check {}: {}", path.display(), e))
        })?;
        if exists {
            debug!("Backup for {} already exists", day);
            return Ok(BackupOutcome::AlreadyExists(path));
        }

        let Some(bytes) = store.load_raw().await? else {
            debug!("No persisted document, nothing to back up");
            return Ok(BackupOutcome::NothingToBackup);
        };

        self.ensure_dir().await?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &bytes).await.map_err(|e| {
            StorageError::Io(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            StorageError::Io(format!("Failed to rename to {}: {}", path.display(), e))
        })?;
        info!("Document backed up to {}", path.display());

        if let Some(keep) = self.retention {
            match self.prune(keep, &path).await {
                Ok(0) => {}
                Ok(removed) => info!("Pruned {} old backups", removed),
                Err(e) => warn!("Failed to prune old backups: {}", e),
            }
        }

        Ok(BackupOutcome::Created(path))
    }

    /// List backups, oldest first. Files that do not follow the naming
    /// scheme are ignored.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, StorageError> {
        let mut entries = match fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(StorageError::Io(format!(
                    "Failed to read dir {}: {}",
                    self.backup_dir.display(),
                    e
                )))
            }
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to read dir entry: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(day) = parse_backup_day(&name) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| StorageError::Io(format!("Failed to get metadata: {}", e)))?;
            backups.push(BackupInfo {
                name,
                day,
                size_bytes: metadata.len(),
            });
        }

        backups.sort_by_key(|b| b.day);
        Ok(backups)
    }

    /// Delete the oldest backups so that at most `keep` remain. `current`
    /// is never deleted.
    async fn prune(&self, keep: NonZeroUsize, current: &Path) -> Result<usize, StorageError> {
        let mut backups = self.list_backups().await?;
        backups.retain(|b| self.backup_dir.join(&b.name) != current);
        let excess = backups.len().saturating_sub(keep.get() - 1);

        for backup in &backups[..excess] {
            let path = self.backup_dir.join(&backup.name);
            fs::remove_file(&path).await.map_err(|e| {
                StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
            })?;
        }
        Ok(excess)
    }
}

fn parse_backup_day(name: &str) -> Option<NaiveDate> {
    let stamp = name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_SUFFIX)?;
    NaiveDate::parse_from_str(stamp, DAY_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::store::LocalDocumentStore;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup(retention: Option<usize>) -> (LocalDocumentStore, BackupManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalDocumentStore::open(temp_dir.path().join("data"))
            .await
            .unwrap();
        let retention = retention.map(|n| NonZeroUsize::new(n).unwrap());
        let backups = BackupManager::new(temp_dir.path().join("backups"), retention);
        (store, backups, temp_dir)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_to_backup() {
        let (store, backups, _temp) = setup(None).await;

        let outcome = backups.backup_if_due(&store).await.unwrap();
        assert_eq!(outcome, BackupOutcome::NothingToBackup);
        assert!(backups.list_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_backup_per_day() {
        let (store, backups, _temp) = setup(None).await;
        let doc = Document::from_value(json!({"2024-01-01": {"submitted": true}})).unwrap();
        store.save(&doc).await.unwrap();

        let first = backups.backup_if_due(&store).await.unwrap();
        let BackupOutcome::Created(path) = first.clone() else {
            panic!("Expected Created, got {:?}", first);
        };

        // A later save on the same day must not produce a second snapshot.
        store.save(&Document::new()).await.unwrap();
        let second = backups.backup_if_due(&store).await.unwrap();
        assert_eq!(second, BackupOutcome::AlreadyExists(path.clone()));

        assert_eq!(backups.list_backups().await.unwrap().len(), 1);
        let saved: Document =
            serde_json::from_slice(&fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(saved, doc);
    }

    #[tokio::test]
    async fn test_backup_is_verbatim_copy() {
        let (store, backups, _temp) = setup(None).await;
        let raw = b"{\"theme\":   \"dark\"}";
        fs::write(store.document_path(), raw).await.unwrap();

        let outcome = backups.backup_for_day(&store, day(2024, 5, 1)).await.unwrap();
        assert_eq!(
            outcome,
            BackupOutcome::Created(backups.backup_path(day(2024, 5, 1)))
        );
        assert_eq!(
            fs::read(backups.backup_path(day(2024, 5, 1))).await.unwrap(),
            raw.to_vec()
        );
    }

    #[tokio::test]
    async fn test_backups_on_different_days() {
        let (store, backups, _temp) = setup(None).await;
        store.save(&Document::new()).await.unwrap();

        for d in [3, 1, 2] {
            backups.backup_for_day(&store, day(2024, 1, d)).await.unwrap();
        }

        let listed = backups.list_backups().await.unwrap();
        let days: Vec<_> = listed.iter().map(|b| b.day).collect();
        assert_eq!(days, vec![day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 3)]);
        assert_eq!(listed[0].name, "backup_20240101.json");
    }

    #[tokio::test]
    async fn test_retention_prunes_oldest() {
        let (store, backups, _temp) = setup(Some(2)).await;
        store.save(&Document::new()).await.unwrap();

        for d in 1..=4 {
            backups.backup_for_day(&store, day(2024, 2, d)).await.unwrap();
        }

        let days: Vec<_> = backups
            .list_backups()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.day)
            .collect();
        assert_eq!(days, vec![day(2024, 2, 3), day(2024, 2, 4)]);
    }

    #[tokio::test]
    async fn test_retention_of_one_keeps_todays_backup() {
        let (store, backups, _temp) = setup(Some(1)).await;
        store.save(&Document::new()).await.unwrap();

        let mut created = 0;
        for _ in 0..3 {
            if let BackupOutcome::Created(_) = backups.backup_if_due(&store).await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(backups.list_backups().await.unwrap().len(), 1);

        // A backup for an earlier day is pruned, never the one just written.
        backups.backup_for_day(&store, day(2020, 1, 1)).await.unwrap();
        let listed = backups.list_backups().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].day, day(2020, 1, 1));
    }

    #[tokio::test]
    async fn test_foreign_files_ignored() {
        let (store, backups, _temp) = setup(Some(1)).await;
        store.save(&Document::new()).await.unwrap();
        backups.ensure_dir().await.unwrap();
        fs::write(backups.backup_dir().join("notes.txt"), b"keep me")
            .await
            .unwrap();

        backups.backup_for_day(&store, day(2024, 3, 1)).await.unwrap();
        backups.backup_for_day(&store, day(2024, 3, 2)).await.unwrap();

        assert_eq!(backups.list_backups().await.unwrap().len(), 1);
        assert!(backups.backup_dir().join("notes.txt").exists());
    }

    #[test]
    fn test_parse_backup_day() {
        assert_eq!(parse_backup_day("backup_20240131.json"), Some(day(2024, 1, 31)));
        assert_eq!(parse_backup_day("backup_20240231.json"), None);
        assert_eq!(parse_backup_day("backup_20240131.json.tmp"), None);
        assert_eq!(parse_backup_day("app_data.json"), None);
    }
}
