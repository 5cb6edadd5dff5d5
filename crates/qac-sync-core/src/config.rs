use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::document::MergePolicy;

/// Process-wide settings for the sync core, built once at startup.
#[derive(Clone)]
pub struct SyncConfig {
    /// Directory holding the live document.
    pub data_dir: PathBuf,
    /// Directory holding daily backups.
    pub backup_dir: PathBuf,
    /// Shared credential every client must present.
    pub sync_password: String,
    /// Number of daily backups to keep; `None` keeps all.
    pub backup_retention: Option<NonZeroUsize>,
    pub policy: MergePolicy,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("data_dir", &self.data_dir)
            .field("backup_dir", &self.backup_dir)
            .field("backup_retention", &self.backup_retention)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
