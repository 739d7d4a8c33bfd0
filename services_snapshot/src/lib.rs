//! # Snapshot Service
//!
//! This crate persists the shell's workspaces and widget state as a versioned
//! JSON document and upgrades older documents through a linear chain of
//! migrations.
//!
//! ## Philosophy
//!
//! - **Identity, not names**: widget state is matched only by `widgetId`
//! - **Migrations are explicit**: each step is registered, ordered, and
//!   recorded in a [`MigrationLineage`](core_types::MigrationLineage)
//! - **No silent data loss**: a pre-migration backup is written before any
//!   step runs, and a failed migration aborts the load
//! - **Atomic writes**: the live file is replaced by rename, never rewritten
//!   in place
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A database or a general key-value store
//! - A migration framework for arbitrary formats
//! - Asynchronous: capture runs synchronously on the caller's thread

pub mod document;
pub mod engine;
pub mod migration;
pub mod store;

pub use document::{
    StateSnapshot, WorkspaceState, CURRENT_SCHEMA_VERSION, CURRENT_WORKSPACE_KEY,
    FOCUSED_WIDGETS_KEY, FOCUS_HISTORY_KEY, LEGACY_SCHEMA_VERSION,
};
pub use engine::{LoadedSnapshot, RecordLocation, RestoreReport, SnapshotEngine};
pub use migration::{MigrationError, MigrationFn, MigrationRegistry, DEFAULT_MAX_CHAIN_LENGTH};
pub use store::{BackupInfo, SnapshotStore, DEFAULT_MAX_BACKUPS};

use core_types::SchemaVersionError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Invalid schema version: {0}")]
    InvalidVersion(#[from] SchemaVersionError),

    #[error("Invalid snapshot document: {0}")]
    InvalidDocument(String),
}

impl SnapshotError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
