//! Shell error types

use services_focus_manager::FocusError;
use services_settings::SettingsError;
use services_snapshot::SnapshotError;
use services_workspace_manager::WorkspaceError;
use thiserror::Error;

/// Shell error types
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Focus error: {0}")]
    Focus(#[from] FocusError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Shell already started")]
    AlreadyStarted,

    #[error("Shell has shut down")]
    ShutDown,
}
