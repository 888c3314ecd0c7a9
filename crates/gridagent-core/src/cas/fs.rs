//! Filesystem-backed content store with git-style 2-char sharding.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{CasError, CasResult, ContentId, ContentStore};

/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`,
/// pins as marker files under `<root>/pins/`.
pub struct FsContentStore {
    objects_dir: PathBuf,
    pins_dir: PathBuf,
}

impl FsContentStore {
    /// Create a store rooted at `root`. Creates the layout if needed.
    pub fn new(root: impl AsRef<Path>) -> CasResult<Self> {
        let objects_dir = root.as_ref().join("objects");
        let pins_dir = root.as_ref().join("pins");
        fs::create_dir_all(&objects_dir)?;
        fs::create_dir_all(&pins_dir)?;
        Ok(Self {
            objects_dir,
            pins_dir,
        })
    }

    fn blob_path(&self, id: &ContentId) -> CasResult<PathBuf> {
        let hex = id.as_str();
        if hex.len() < 3 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CasError::InvalidId(hex.to_string()));
        }
        Ok(self.objects_dir.join(&hex[..2]).join(&hex[2..]))
    }

    fn put_bytes(&self, data: &[u8]) -> CasResult<ContentId> {
        let id = ContentId::compute(data);
        let path = self.blob_path(&id)?;

        if path.exists() {
            return Ok(id);
        }

        let shard_dir = path
            .parent()
            .ok_or_else(|| CasError::InvalidId(id.to_string()))?;
        fs::create_dir_all(shard_dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| CasError::Io(e.error))?;

        Ok(id)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn add(&self, path: &Path) -> CasResult<ContentId> {
        let data = fs::read(path)?;
        self.put_bytes(&data)
    }

    async fn add_bytes(&self, data: &[u8], _name: Option<&str>) -> CasResult<ContentId> {
        self.put_bytes(data)
    }

    async fn get(&self, id: &ContentId, out_path: &Path) -> CasResult<()> {
        let blob = self.blob_path(id)?;
        let data = fs::read(&blob).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CasError::NotFound(id.clone())
            } else {
                CasError::Io(e)
            }
        })?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(out_path, data)?;
        Ok(())
    }

    async fn pin(&self, id: &ContentId) -> CasResult<()> {
        let blob = self.blob_path(id)?;
        if !blob.exists() {
            return Err(CasError::NotFound(id.clone()));
        }
        fs::write(self.pins_dir.join(id.as_str()), b"")?;
        Ok(())
    }
}
