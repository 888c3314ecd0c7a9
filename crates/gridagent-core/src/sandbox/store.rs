//! Per-workspace directory jail with validated file CRUD.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cas::ContentId;

use super::error::{SandboxError, SandboxResult};
use super::validate::{
    confirm_within_root, validate_relative_path, validate_workspace_id, validate_write_target,
};

/// Name of the per-workspace metadata record.
pub const META_FILE: &str = ".sandbox-meta.json";

/// Fixed subdirectory layout materialized by `ensure()`.
pub const SANDBOX_SUBDIRS: &[&str] = &["code", "output", "data"];

/// Configuration for a [`SandboxStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Host directory under which all workspace sandboxes live.
    pub root: PathBuf,
    /// Advisory per-workspace storage cap in bytes.
    pub max_workspace_bytes: u64,
    /// Wall-clock timeout applied when the caller does not supply one.
    pub default_timeout_ms: u64,
    /// Cap on captured stdout/stderr per execution.
    pub max_output_bytes: usize,
}

impl SandboxConfig {
    /// Defaults rooted at `root`: 500 MB quota, 30 s timeout, 1 MB output.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_workspace_bytes: 500 * 1024 * 1024,
            default_timeout_ms: 30_000,
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Per-workspace metadata, persisted alongside the sandbox directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxMeta {
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub last_sync_content_id: Option<ContentId>,
    pub total_size_bytes: u64,
}

/// One directory entry produced by listing. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub relative_path: String,
    pub is_directory: bool,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Result of one command invocation inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Workspace-scoped filesystem jail.
///
/// Every operation validates the workspace id and relative path before any
/// filesystem call; reads and deletes additionally confirm the
/// symlink-resolved target stays under the sandbox root. The store owns
/// the on-disk sandbox content for its workspaces.
///
/// Quota checks and writes are not atomic with respect to each other;
/// concurrent writers to the same workspace need external serialization.
pub struct SandboxStore {
    config: SandboxConfig,
}

impl SandboxStore {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Nominal sandbox root for a workspace (id validated, no I/O).
    pub fn workspace_root(&self, workspace_id: &str) -> SandboxResult<PathBuf> {
        validate_workspace_id(workspace_id)?;
        Ok(self.config.root.join(workspace_id))
    }

    /// Idempotently materialize the sandbox layout and metadata record.
    pub fn ensure(&self, workspace_id: &str) -> SandboxResult<PathBuf> {
        let root = self.workspace_root(workspace_id)?;
        for sub in SANDBOX_SUBDIRS {
            fs::create_dir_all(root.join(sub))?;
        }
        let meta_path = root.join(META_FILE);
        if !meta_path.exists() {
            let meta = SandboxMeta {
                workspace_id: workspace_id.to_string(),
                created_at: Utc::now(),
                last_sync_content_id: None,
                total_size_bytes: 0,
            };
            fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)?;
            debug!(event = "sandbox.created", workspace_id = %workspace_id);
        }
        Ok(root)
    }

    /// Load the metadata record for an existing sandbox.
    pub fn meta(&self, workspace_id: &str) -> SandboxResult<SandboxMeta> {
        let root = self.existing_root(workspace_id)?;
        let raw = fs::read(root.join(META_FILE)).map_err(|_| SandboxError::WorkspaceMissing {
            workspace_id: workspace_id.to_string(),
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub(crate) fn save_meta(&self, workspace_id: &str, meta: &SandboxMeta) -> SandboxResult<()> {
        let root = self.existing_root(workspace_id)?;
        fs::write(root.join(META_FILE), serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }

    fn existing_root(&self, workspace_id: &str) -> SandboxResult<PathBuf> {
        let root = self.workspace_root(workspace_id)?;
        if !root.is_dir() {
            return Err(SandboxError::WorkspaceMissing {
                workspace_id: workspace_id.to_string(),
            });
        }
        Ok(root)
    }

    /// Write a text file at a validated relative path, subject to the
    /// extension allow-list and the storage quota.
    ///
    /// The quota is recomputed by a full walk before the write; on refusal
    /// the filesystem is left unchanged.
    pub fn write_file(
        &self,
        workspace_id: &str,
        relative_path: &str,
        content: &str,
    ) -> SandboxResult<()> {
        let rel = validate_relative_path(relative_path)?;
        validate_write_target(&rel)?;
        let root = self.ensure(workspace_id)?;

        let current = self.get_size(workspace_id)?;
        let incoming = content.len() as u64;
        if current + incoming > self.config.max_workspace_bytes {
            warn!(
                event = "sandbox.quota_refused",
                workspace_id = %workspace_id,
                current,
                incoming,
                limit = self.config.max_workspace_bytes,
            );
            return Err(SandboxError::QuotaExceeded {
                current,
                incoming,
                limit: self.config.max_workspace_bytes,
            });
        }

        let target = root.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        debug!(
            event = "sandbox.write",
            workspace_id = %workspace_id,
            path = %rel.display(),
            bytes = incoming,
        );
        Ok(())
    }

    /// Read a file back as text. The symlink-resolved path must remain
    /// under the sandbox root.
    pub fn read_file(&self, workspace_id: &str, relative_path: &str) -> SandboxResult<String> {
        let rel = validate_relative_path(relative_path)?;
        let root = self.existing_root(workspace_id)?;
        let real = confirm_within_root(&root, &root.join(&rel))?;
        Ok(fs::read_to_string(real)?)
    }

    /// List entries of a sandbox directory (the root when `dir` is `None`).
    pub fn list_files(
        &self,
        workspace_id: &str,
        dir: Option<&str>,
    ) -> SandboxResult<Vec<FileInfo>> {
        let root = self.existing_root(workspace_id)?;
        let (base, prefix) = match dir {
            Some(d) => {
                let rel = validate_relative_path(d)?;
                let real = confirm_within_root(&root, &root.join(&rel))?;
                (real, format!("{}/", rel.display()))
            }
            None => (root.clone(), String::new()),
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(base)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == META_FILE {
                continue;
            }
            let metadata = entry.metadata()?;
            entries.push(FileInfo {
                relative_path: format!("{prefix}{name}"),
                is_directory: metadata.is_dir(),
                size_bytes: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                name,
            });
        }
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(entries)
    }

    /// Delete a file or directory. Symlink-resolved target must remain
    /// under the sandbox root; the metadata record cannot be deleted.
    pub fn delete_file(&self, workspace_id: &str, relative_path: &str) -> SandboxResult<()> {
        let rel = validate_relative_path(relative_path)?;
        if rel.as_os_str() == META_FILE {
            return Err(SandboxError::PathRejected {
                path: relative_path.to_string(),
                reason: "metadata record cannot be deleted".into(),
            });
        }
        let root = self.existing_root(workspace_id)?;
        let real = confirm_within_root(&root, &root.join(&rel))?;
        if real.is_dir() {
            fs::remove_dir_all(real)?;
        } else {
            fs::remove_file(real)?;
        }
        Ok(())
    }

    /// Advisory total size of the workspace in bytes.
    ///
    /// Full recursive walk; entries that fail to stat are skipped, so a
    /// partial total is possible. Not a security boundary.
    pub fn get_size(&self, workspace_id: &str) -> SandboxResult<u64> {
        let root = self.workspace_root(workspace_id)?;
        if !root.is_dir() {
            return Ok(0);
        }
        Ok(walk_size(&root))
    }

    /// Explicit workspace teardown: removes the tree and the metadata.
    pub fn delete_workspace(&self, workspace_id: &str) -> SandboxResult<()> {
        let root = self.existing_root(workspace_id)?;
        fs::remove_dir_all(root)?;
        Ok(())
    }
}

fn walk_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut total = 0u64;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            total += walk_size(&entry.path());
        } else {
            total += metadata.len();
        }
    }
    total
}
