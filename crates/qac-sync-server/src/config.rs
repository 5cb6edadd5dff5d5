use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use qac_sync_core::{MergePolicy, SyncConfig, DEFAULT_CREDENTIAL_FIELD, DEFAULT_SETTINGS_KEY};

/// Configuration for the qac-sync-server.
#[derive(Parser, Clone)]
#[command(name = "qac-sync-server")]
#[command(about = "Sync server for the qac daily task log")]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "SYNC_HOST")]
    pub host: String,

    /// Port to bind to
    #[arg(long, default_value = "5000", env = "SYNC_PORT")]
    pub port: u16,

    /// Directory holding the live document
    #[arg(long, env = "SYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding daily backups
    #[arg(long, env = "SYNC_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Shared password clients send in the X-Sync-Password header
    #[arg(long, env = "SYNC_PASSWORD", hide_env_values = true)]
    pub sync_password: String,

    /// Settings object whose credential field is protected
    #[arg(long, default_value = DEFAULT_SETTINGS_KEY, env = "SYNC_SETTINGS_KEY")]
    pub settings_key: String,

    /// Name of the protected credential field
    #[arg(long, default_value = DEFAULT_CREDENTIAL_FIELD, env = "SYNC_CREDENTIAL_FIELD")]
    pub credential_field: String,

    /// Number of daily backups to keep, at least 1 (all if unset)
    #[arg(long, env = "SYNC_BACKUP_RETENTION")]
    pub backup_retention: Option<NonZeroUsize>,
}

impl Config {
    /// Get the effective data directory.
    pub fn effective_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("qac-sync")
                .join("data")
        })
    }

    /// Get the effective backup directory, a sibling of the data directory
    /// by default.
    pub fn effective_backup_dir(&self) -> PathBuf {
        self.backup_dir.clone().unwrap_or_else(|| {
            let data_dir = self.effective_data_dir();
            data_dir
                .parent()
                .map(|p| p.join("backups"))
                .unwrap_or_else(|| data_dir.join("backups"))
        })
    }

    /// Build the core configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            data_dir: self.effective_data_dir(),
            backup_dir: self.effective_backup_dir(),
            sync_password: self.sync_password.clone(),
            backup_retention: self.backup_retention,
            policy: MergePolicy::new(&self.settings_key, &self.credential_field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["qac-sync-server", "--sync-password", "pw"]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.settings_key, "system_settings");
        assert_eq!(config.credential_field, "syncPassword");
        assert!(config.backup_retention.is_none());

        let sync = config.sync_config();
        assert!(sync.data_dir.ends_with("qac-sync/data"));
        assert!(sync.backup_dir.ends_with("qac-sync/backups"));
    }

    #[test]
    fn test_zero_retention_rejected() {
        let result = Config::try_parse_from([
            "qac-sync-server",
            "--sync-password",
            "pw",
            "--backup-retention",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_dirs() {
        let config = Config::parse_from([
            "qac-sync-server",
            "--sync-password",
            "pw",
            "--data-dir",
            "/srv/sync/data",
            "--backup-retention",
            "30",
        ]);
        let sync = config.sync_config();
        assert_eq!(sync.data_dir, PathBuf::from("/srv/sync/data"));
        assert_eq!(sync.backup_dir, PathBuf::from("/srv/sync/backups"));
        assert_eq!(sync.backup_retention, NonZeroUsize::new(30));
    }
}
