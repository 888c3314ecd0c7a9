//! Content-addressed store collaborator used by sandbox sync.
//!
//! The sandbox only needs four operations: add a file, add raw bytes,
//! fetch a blob to a path, and pin an id against garbage collection.
//! [`FsContentStore`] is the filesystem-backed default; a remote
//! (IPFS-style) daemon can implement [`ContentStore`] the same way.

pub mod fs;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use fs::FsContentStore;

/// Hex-encoded sha-256 identifier for stored content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    /// Compute the id for a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors produced by content store operations.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    #[error("content not found: {0}")]
    NotFound(ContentId),

    #[error("invalid content id: {0}")]
    InvalidId(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for content store operations.
pub type CasResult<T> = std::result::Result<T, CasError>;

/// Store contract consumed by [`crate::sandbox::SandboxStore`] sync.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store the file at `path`, returning its content id.
    async fn add(&self, path: &Path) -> CasResult<ContentId>;

    /// Store raw bytes. `name` is an optional display hint only.
    async fn add_bytes(&self, data: &[u8], name: Option<&str>) -> CasResult<ContentId>;

    /// Fetch the blob for `id` into `out_path`.
    async fn get(&self, id: &ContentId, out_path: &Path) -> CasResult<()>;

    /// Pin `id` against garbage collection.
    async fn pin(&self, id: &ContentId) -> CasResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_deterministic() {
        assert_eq!(ContentId::compute(b"abc"), ContentId::compute(b"abc"));
        assert_ne!(ContentId::compute(b"abc"), ContentId::compute(b"abd"));
    }

    #[test]
    fn test_content_id_is_hex_sha256() {
        let id = ContentId::compute(b"");
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_id_serde_transparent() {
        let id = ContentId::compute(b"payload");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
