//! Execution context threaded into tool dispatch for one run.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::sandbox::{ExecutionResult, FileInfo, SandboxStore};

/// Delegate for sandboxes living on a different node.
///
/// A synchronous-looking facade over the node's request/response protocol.
/// Result shapes mirror [`SandboxStore`] exactly so tool text formatting
/// is identical regardless of mode.
#[async_trait]
pub trait SandboxDelegate: Send + Sync {
    async fn write_file(
        &self,
        node_id: &str,
        workspace_id: &str,
        relative_path: &str,
        content: &str,
    ) -> Result<()>;

    async fn read_file(
        &self,
        node_id: &str,
        workspace_id: &str,
        relative_path: &str,
    ) -> Result<String>;

    async fn list_files(
        &self,
        node_id: &str,
        workspace_id: &str,
        dir: Option<&str>,
    ) -> Result<Vec<FileInfo>>;

    async fn delete_file(
        &self,
        node_id: &str,
        workspace_id: &str,
        relative_path: &str,
    ) -> Result<()>;

    async fn execute(
        &self,
        node_id: &str,
        workspace_id: &str,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Result<ExecutionResult>;
}

/// Where sandbox-backed tools should send their work.
///
/// Matched once per tool call; the `Unavailable` branch makes the
/// "no sandbox configured" case explicit instead of a runtime fallthrough.
#[derive(Clone)]
pub enum ToolContext {
    /// Sandbox on this node.
    Local {
        workspace_id: String,
        sandbox: Arc<SandboxStore>,
    },
    /// Sandbox on a remote node, reached through a delegate.
    Remote {
        workspace_id: String,
        node_id: String,
        delegate: Arc<dyn SandboxDelegate>,
    },
    /// No sandbox configured; sandbox tools report unavailability.
    Unavailable,
}

impl ToolContext {
    pub fn workspace_id(&self) -> Option<&str> {
        match self {
            Self::Local { workspace_id, .. } | Self::Remote { workspace_id, .. } => {
                Some(workspace_id)
            }
            Self::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { workspace_id, .. } => {
                f.debug_struct("Local").field("workspace_id", workspace_id).finish()
            }
            Self::Remote {
                workspace_id,
                node_id,
                ..
            } => f
                .debug_struct("Remote")
                .field("workspace_id", workspace_id)
                .field("node_id", node_id)
                .finish(),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;

    #[test]
    fn test_context_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(SandboxStore::new(SandboxConfig::new(dir.path())));

        let local = ToolContext::Local {
            workspace_id: "ws1".into(),
            sandbox,
        };
        assert_eq!(local.workspace_id(), Some("ws1"));
        assert!(local.is_available());

        assert_eq!(ToolContext::Unavailable.workspace_id(), None);
        assert!(!ToolContext::Unavailable.is_available());
    }
}
