//! Whole-tree sandbox sync through the content-addressed store.
//!
//! `sync_out` stores every file and a manifest mapping relative path to
//! content id; `sync_in` replays a manifest into a freshly ensured
//! sandbox. Best-effort operations with no incremental diff; not used for
//! security enforcement.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cas::{ContentId, ContentStore};

use super::error::SandboxResult;
use super::store::{SandboxStore, META_FILE};
use super::validate::validate_relative_path;

/// Mapping from sandbox-relative path to content id, itself stored and
/// pinned in the content store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub files: BTreeMap<String, ContentId>,
}

impl SandboxStore {
    /// Store the whole sandbox tree and record the manifest id in the
    /// workspace metadata. Returns the manifest's content id.
    pub async fn sync_out(
        &self,
        workspace_id: &str,
        store: &dyn ContentStore,
    ) -> SandboxResult<ContentId> {
        let root = self.ensure(workspace_id)?;

        let mut files = BTreeMap::new();
        let mut paths = Vec::new();
        collect_files(&root, &root, &mut paths);
        for rel in paths {
            let id = store.add(&root.join(&rel)).await?;
            files.insert(rel.to_string_lossy().replace('\\', "/"), id);
        }

        let manifest = Manifest {
            workspace_id: workspace_id.to_string(),
            created_at: Utc::now(),
            files,
        };
        let manifest_id = store
            .add_bytes(
                &serde_json::to_vec_pretty(&manifest)?,
                Some(&format!("{workspace_id}.manifest.json")),
            )
            .await?;
        store.pin(&manifest_id).await?;

        let mut meta = self.meta(workspace_id)?;
        meta.last_sync_content_id = Some(manifest_id.clone());
        meta.total_size_bytes = self.get_size(workspace_id)?;
        self.save_meta(workspace_id, &meta)?;

        debug!(
            event = "sandbox.sync_out",
            workspace_id = %workspace_id,
            manifest = %manifest_id,
            files = manifest.files.len(),
        );
        Ok(manifest_id)
    }

    /// Replay a manifest into a freshly ensured sandbox.
    ///
    /// Manifest entries with invalid relative paths are skipped, so a
    /// hostile manifest cannot write outside the jail.
    pub async fn sync_in(
        &self,
        workspace_id: &str,
        manifest_id: &ContentId,
        store: &dyn ContentStore,
    ) -> SandboxResult<usize> {
        let root = self.ensure(workspace_id)?;

        let scratch = root.join(".tmp");
        fs::create_dir_all(&scratch)?;
        let manifest_path = scratch.join("manifest.json");
        store.get(manifest_id, &manifest_path).await?;
        let manifest: Manifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
        let _ = fs::remove_file(&manifest_path);

        let mut restored = 0usize;
        for (rel, id) in &manifest.files {
            let rel_path = match validate_relative_path(rel) {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        event = "sandbox.sync_in_skipped",
                        workspace_id = %workspace_id,
                        path = %rel,
                        error = %e,
                    );
                    continue;
                }
            };
            store.get(id, &root.join(&rel_path)).await?;
            restored += 1;
        }

        let mut meta = self.meta(workspace_id)?;
        meta.last_sync_content_id = Some(manifest_id.clone());
        meta.total_size_bytes = self.get_size(workspace_id)?;
        self.save_meta(workspace_id, &meta)?;

        debug!(
            event = "sandbox.sync_in",
            workspace_id = %workspace_id,
            manifest = %manifest_id,
            restored,
        );
        Ok(restored)
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if name == META_FILE || name == ".tmp" {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::FsContentStore;
    use crate::sandbox::store::SandboxConfig;

    fn make_pair() -> (tempfile::TempDir, SandboxStore, FsContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxStore::new(SandboxConfig::new(dir.path().join("sandboxes")));
        let cas = FsContentStore::new(dir.path().join("cas")).unwrap();
        (dir, sandbox, cas)
    }

    #[tokio::test]
    async fn test_sync_roundtrip() {
        let (_dir, sandbox, cas) = make_pair();
        sandbox.write_file("ws1", "code/main.py", "print(1)").unwrap();
        sandbox.write_file("ws1", "data/notes.txt", "hello").unwrap();

        let manifest_id = sandbox.sync_out("ws1", &cas).await.unwrap();
        assert_eq!(
            sandbox.meta("ws1").unwrap().last_sync_content_id,
            Some(manifest_id.clone())
        );

        let restored = sandbox.sync_in("ws2", &manifest_id, &cas).await.unwrap();
        assert_eq!(restored, 2);
        assert_eq!(sandbox.read_file("ws2", "code/main.py").unwrap(), "print(1)");
        assert_eq!(sandbox.read_file("ws2", "data/notes.txt").unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_sync_out_skips_meta_and_tmp() {
        let (_dir, sandbox, cas) = make_pair();
        sandbox.write_file("ws1", "code/a.py", "x = 1").unwrap();

        let manifest_id = sandbox.sync_out("ws1", &cas).await.unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let manifest_path = scratch.path().join("m.json");
        cas.get(&manifest_id, &manifest_path).await.unwrap();
        let manifest: Manifest =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();

        assert_eq!(manifest.files.len(), 1);
        assert!(manifest.files.contains_key("code/a.py"));
    }

    #[tokio::test]
    async fn test_sync_in_skips_hostile_manifest_entries() {
        let (_dir, sandbox, cas) = make_pair();
        sandbox.ensure("ws1").unwrap();

        let blob = cas.add_bytes(b"evil", None).await.unwrap();
        let mut files = BTreeMap::new();
        files.insert("../escape.txt".to_string(), blob.clone());
        files.insert("data/ok.txt".to_string(), blob);
        let manifest = Manifest {
            workspace_id: "ws1".into(),
            created_at: Utc::now(),
            files,
        };
        let manifest_id = cas
            .add_bytes(&serde_json::to_vec(&manifest).unwrap(), None)
            .await
            .unwrap();

        let restored = sandbox.sync_in("ws1", &manifest_id, &cas).await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(sandbox.read_file("ws1", "data/ok.txt").unwrap(), "evil");
    }
}
