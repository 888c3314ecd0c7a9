//! Error types for the sandbox layer.

use crate::cas::CasError;

/// Errors produced by sandbox validation and storage operations.
///
/// Validation failures are returned before any filesystem call is made.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("invalid workspace id '{id}': {reason}")]
    InvalidWorkspaceId { id: String, reason: String },

    #[error("path rejected '{path}': {reason}")]
    PathRejected { path: String, reason: String },

    #[error("file type not allowed for writing: {path}")]
    ExtensionNotAllowed { path: String },

    #[error("storage quota exceeded: {current} + {incoming} bytes would pass the {limit} byte limit")]
    QuotaExceeded {
        current: u64,
        incoming: u64,
        limit: u64,
    },

    #[error("blocked command matched pattern '{pattern}'")]
    BlockedCommand { pattern: String },

    #[error("not found in sandbox: {path}")]
    NotFound { path: String },

    #[error("workspace has no sandbox yet: {workspace_id}")]
    WorkspaceMissing { workspace_id: String },

    #[error("sync error: {0}")]
    Sync(#[from] CasError),

    #[error("metadata error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
