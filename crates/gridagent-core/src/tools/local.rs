//! Unsandboxed host tools for trusted operation.
//!
//! These touch the node's real filesystem and shell with no jail. They are
//! registered only when the operator explicitly opts in; nothing in the
//! default registries pulls them in.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ToolContext, ToolDefinition, ToolHandler, ToolRegistry};
use crate::sandbox::exec::drain_capped;

const LOCAL_EXEC_TIMEOUT: Duration = Duration::from_secs(30);
const LOCAL_OUTPUT_CAP: usize = 64 * 1024;

/// Register the trusted-host tool family.
pub fn register_local_tools(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "local_read_file",
        "Read a file from the host filesystem (trusted mode only)",
        "absolute or relative path",
        Arc::new(LocalReadFileTool),
    ));
    registry.register(ToolDefinition::new(
        "local_list_dir",
        "List a directory on the host filesystem (trusted mode only)",
        "directory path, or empty for the current directory",
        Arc::new(LocalListDirTool),
    ));
    registry.register(ToolDefinition::new(
        "local_execute",
        "Run a shell command on the host (trusted mode only)",
        "the command line",
        Arc::new(LocalExecuteTool),
    ));
    registry.register(ToolDefinition::new(
        "local_find",
        "Find files by name substring under a host directory (trusted mode only)",
        "directory path, '::', then name substring, e.g. /srv/app :: config",
        Arc::new(LocalFindTool),
    ));
}

struct LocalReadFileTool;

#[async_trait]
impl ToolHandler for LocalReadFileTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        let path = input.trim();
        if path.is_empty() {
            return Ok("Invalid input: expected a file path".to_string());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {path}"))?;
        Ok(content)
    }
}

struct LocalListDirTool;

#[async_trait]
impl ToolHandler for LocalListDirTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        let dir = match input.trim() {
            "" => ".",
            d => d,
        };
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("listing {dir}"))?;
        let mut lines = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            lines.push(if is_dir { format!("{name}/") } else { name });
        }
        if lines.is_empty() {
            return Ok("(empty)".to_string());
        }
        lines.sort();
        Ok(lines.join("\n"))
    }
}

struct LocalExecuteTool;

#[async_trait]
impl ToolHandler for LocalExecuteTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        let command = input.trim();
        if command.is_empty() {
            return Ok("Invalid input: expected a shell command".to_string());
        }
        debug!(event = "tools.local_execute", command = %command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .context("spawning shell")?;

        let (stdout_pipe, stderr_pipe) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return Ok("Failed to capture command output".to_string()),
        };

        let outcome = tokio::time::timeout(LOCAL_EXEC_TIMEOUT, async {
            let (stdout_buf, stderr_buf, exceeded) =
                drain_capped(stdout_pipe, stderr_pipe, LOCAL_OUTPUT_CAP).await;
            if exceeded {
                return (stdout_buf, stderr_buf, true, None);
            }
            let status = child.wait().await.ok();
            (stdout_buf, stderr_buf, false, status)
        })
        .await;

        let (stdout_buf, stderr_buf, status) = match outcome {
            Ok((_, _, true, _)) => {
                let _ = child.kill().await;
                return Ok(format!(
                    "Command produced more than {LOCAL_OUTPUT_CAP} bytes of output and was terminated"
                ));
            }
            Ok((stdout_buf, stderr_buf, false, status)) => (stdout_buf, stderr_buf, status),
            Err(_) => {
                let _ = child.kill().await;
                return Ok(format!(
                    "Command timed out after {}s",
                    LOCAL_EXEC_TIMEOUT.as_secs()
                ));
            }
        };

        let mut text = format!(
            "Exit code: {}\n",
            status
                .and_then(|s| s.code())
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        let stdout = cap(&String::from_utf8_lossy(&stdout_buf));
        let stderr = cap(&String::from_utf8_lossy(&stderr_buf));
        if !stdout.is_empty() {
            text.push_str(&format!("stdout:\n{stdout}\n"));
        }
        if !stderr.is_empty() {
            text.push_str(&format!("stderr:\n{stderr}\n"));
        }
        Ok(text.trim_end().to_string())
    }
}

struct LocalFindTool;

#[async_trait]
impl ToolHandler for LocalFindTool {
    async fn call(&self, input: &str, _ctx: &ToolContext) -> Result<String> {
        let Some((dir, needle)) = input.split_once("::") else {
            return Ok("Invalid input: expected 'directory :: name substring'".to_string());
        };
        let (dir, needle) = (dir.trim(), needle.trim().to_lowercase());
        if needle.is_empty() {
            return Ok("Invalid input: name substring is empty".to_string());
        }

        let mut hits = Vec::new();
        find_recursive(Path::new(dir), &needle, &mut hits, 0);
        if hits.is_empty() {
            return Ok(format!("No files matching '{needle}' under {dir}"));
        }
        hits.sort();
        hits.truncate(200);
        Ok(hits.join("\n"))
    }
}

const FIND_MAX_DEPTH: usize = 8;

fn find_recursive(dir: &Path, needle: &str, hits: &mut Vec<String>, depth: usize) {
    if depth > FIND_MAX_DEPTH || hits.len() >= 200 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains(needle) {
            hits.push(path.display().to_string());
        }
        if path.is_dir() && !path.is_symlink() {
            find_recursive(&path, needle, hits, depth + 1);
        }
    }
}

fn cap(text: &str) -> String {
    if text.len() <= LOCAL_OUTPUT_CAP {
        return text.trim_end().to_string();
    }
    let mut cut = LOCAL_OUTPUT_CAP;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n... (truncated)", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_read_and_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let mut registry = ToolRegistry::new();
        register_local_tools(&mut registry);

        let text = registry
            .dispatch(
                "local_read_file",
                dir.path().join("note.txt").to_str().unwrap(),
                &ToolContext::Unavailable,
            )
            .await;
        assert_eq!(text, "hello");

        let text = registry
            .dispatch(
                "local_list_dir",
                dir.path().to_str().unwrap(),
                &ToolContext::Unavailable,
            )
            .await;
        assert_eq!(text, "note.txt\nsub/");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_execute() {
        let mut registry = ToolRegistry::new();
        register_local_tools(&mut registry);
        let text = registry
            .dispatch("local_execute", "echo trusted", &ToolContext::Unavailable)
            .await;
        assert!(text.contains("Exit code: 0"));
        assert!(text.contains("trusted"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_execute_overflow_is_terminated() {
        let mut registry = ToolRegistry::new();
        register_local_tools(&mut registry);
        let text = registry
            .dispatch(
                "local_execute",
                "head -c 1000000 /dev/zero | tr '\\0' 'a'",
                &ToolContext::Unavailable,
            )
            .await;
        assert!(text.contains("was terminated"));
        assert!(!text.contains("Exit code: 0"));
    }

    #[tokio::test]
    async fn test_local_find() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/config.toml"), "").unwrap();
        std::fs::write(dir.path().join("other.txt"), "").unwrap();

        let mut registry = ToolRegistry::new();
        register_local_tools(&mut registry);
        let input = format!("{} :: config", dir.path().display());
        let text = registry
            .dispatch("local_find", &input, &ToolContext::Unavailable)
            .await;
        assert!(text.ends_with("config.toml"));

        let input = format!("{} :: missing", dir.path().display());
        let text = registry
            .dispatch("local_find", &input, &ToolContext::Unavailable)
            .await;
        assert!(text.starts_with("No files matching"));
    }

    #[tokio::test]
    async fn test_missing_file_becomes_error_text() {
        let mut registry = ToolRegistry::new();
        register_local_tools(&mut registry);
        let text = registry
            .dispatch(
                "local_read_file",
                "/definitely/not/a/real/path.txt",
                &ToolContext::Unavailable,
            )
            .await;
        assert!(text.starts_with("Error executing local_read_file:"));
    }
}
