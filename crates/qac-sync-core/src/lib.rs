//! Core of the qac sync server.
//!
//! One JSON document (per-day task records plus settings) is shared between
//! the server and a handful of client devices. This crate provides:
//! - `Document` / `MergePolicy`: the document model and key classification
//! - `merge`: the two-party conflict resolution
//! - `DocumentStore`: durable load/save with atomic replace
//! - `BackupManager`: at most one snapshot per calendar day
//! - `SyncCoordinator`: the serialized backup, load, merge, save sequence

mod backup;
mod config;
mod coordinator;
mod document;
mod error;
mod merge;
mod store;

pub use backup::{BackupInfo, BackupManager, BackupOutcome};
pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, SyncRequest, SyncResult};
pub use document::{
    is_date_key, DateRecord, Document, MergePolicy, RecordKey, DEFAULT_CREDENTIAL_FIELD,
    DEFAULT_SETTINGS_KEY,
};
pub use error::{StorageError, SyncError};
pub use merge::{merge, resolve_date_record, resolve_drafts, MergeResult, Winner};
pub use store::{DocumentStore, LoadOutcome, LocalDocumentStore, DOCUMENT_FILE};
