//! Input validation for workspace ids, relative paths, and write targets.
//!
//! Every rule here runs before any filesystem call. The grammar is
//! deliberately restrictive: a workspace id is `[A-Za-z0-9_-]{1,64}`, a
//! relative path may not contain parent segments or a root marker, and
//! write targets must carry an allow-listed extension (or be a known
//! extension-less build file).

use std::path::{Component, Path, PathBuf};

use super::error::{SandboxError, SandboxResult};

/// Longest accepted workspace identifier.
pub const MAX_WORKSPACE_ID_LEN: usize = 64;

/// Extensions accepted for sandbox writes: source, config, text, data.
const ALLOWED_WRITE_EXTENSIONS: &[&str] = &[
    // source
    "rs", "py", "js", "ts", "jsx", "tsx", "go", "c", "h", "cpp", "hpp", "cc", "java", "kt", "rb",
    "php", "swift", "scala", "lua", "pl", "r", "sh", "bash", "ps1", "bat",
    // config
    "json", "yaml", "yml", "toml", "xml", "ini", "cfg", "conf", "env", "properties", "lock",
    // text / docs
    "txt", "md", "rst", "log", "html", "htm", "css", "svg",
    // data
    "csv", "tsv", "sql", "ipynb", "proto", "graphql",
];

/// Extension-less build files accepted by exact basename.
const ALLOWED_BASENAMES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "CMakeLists.txt",
    "Gemfile",
    "Rakefile",
    "Procfile",
    ".gitignore",
    ".dockerignore",
    ".editorconfig",
];

/// Validate a workspace identifier.
pub fn validate_workspace_id(id: &str) -> SandboxResult<()> {
    if id.is_empty() {
        return Err(SandboxError::InvalidWorkspaceId {
            id: id.to_string(),
            reason: "must not be empty".into(),
        });
    }
    if id.len() > MAX_WORKSPACE_ID_LEN {
        return Err(SandboxError::InvalidWorkspaceId {
            id: id.to_string(),
            reason: format!("longer than {MAX_WORKSPACE_ID_LEN} characters"),
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SandboxError::InvalidWorkspaceId {
            id: id.to_string(),
            reason: "only alphanumerics, dash, and underscore are allowed".into(),
        });
    }
    Ok(())
}

/// Validate a sandbox-relative path and return its normalized form.
///
/// Rejects empty paths, rooted paths (leading `/`, `\`, or a drive
/// letter), and any `..` segment. Normalization strips `.` components; a
/// result that would start with a parent marker is also rejected.
pub fn validate_relative_path(path: &str) -> SandboxResult<PathBuf> {
    let reject = |reason: &str| {
        Err(SandboxError::PathRejected {
            path: path.to_string(),
            reason: reason.into(),
        })
    };

    if path.trim().is_empty() {
        return reject("must not be empty");
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return reject("must be relative, not rooted");
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return reject("drive-letter paths are not allowed");
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return reject("parent-directory segments are not allowed"),
            Component::RootDir | Component::Prefix(_) => {
                return reject("must be relative, not rooted")
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return reject("normalizes to nothing");
    }
    if matches!(normalized.components().next(), Some(Component::ParentDir)) {
        return reject("normalizes outside the sandbox");
    }

    Ok(normalized)
}

/// Validate a write destination's file type.
pub fn validate_write_target(path: &Path) -> SandboxResult<()> {
    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if ALLOWED_BASENAMES.contains(&basename) {
        return Ok(());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_WRITE_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(SandboxError::ExtensionNotAllowed {
            path: path.display().to_string(),
        }),
    }
}

/// Confirm that the symlink-resolved `candidate` is still a descendant of
/// the symlink-resolved sandbox `root`.
pub fn confirm_within_root(root: &Path, candidate: &Path) -> SandboxResult<PathBuf> {
    let real_root = root.canonicalize()?;
    let real = candidate
        .canonicalize()
        .map_err(|_| SandboxError::NotFound {
            path: candidate.display().to_string(),
        })?;
    if !real.starts_with(&real_root) {
        return Err(SandboxError::PathRejected {
            path: candidate.display().to_string(),
            reason: "resolves outside the sandbox root".into(),
        });
    }
    Ok(real)
}
