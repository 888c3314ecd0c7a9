//! Sandbox-backed tools: file CRUD, shell execution, run_code.
//!
//! Every tool here matches the [`ToolContext`] once: `Local` goes straight
//! to the [`SandboxStore`], `Remote` through the node delegate, and
//! `Unavailable` produces explanatory text instead of an error. Output
//! formatting is shared so local and remote runs read identically.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::sandbox::{ExecutionResult, FileInfo};
use crate::security::ThreatScanner;

use super::{ToolContext, ToolDefinition, ToolHandler, ToolRegistry};

/// Register the sandbox tool family. Commands headed for the shell are
/// re-checked against `scanner` at the point of use, independent of any
/// earlier goal or action screening.
pub fn register_sandbox_tools(registry: &mut ToolRegistry, scanner: Arc<ThreatScanner>) {
    registry.register(ToolDefinition::new(
        "write_file",
        "Write a text file into the workspace sandbox",
        "relative path, '::', then content, e.g. code/main.py :: print(1)",
        Arc::new(WriteFileTool),
    ));
    registry.register(ToolDefinition::new(
        "read_file",
        "Read a text file from the workspace sandbox",
        "relative path, e.g. code/main.py",
        Arc::new(ReadFileTool),
    ));
    registry.register(ToolDefinition::new(
        "list_files",
        "List files in the workspace sandbox",
        "directory relative path, or empty for the sandbox root",
        Arc::new(ListFilesTool),
    ));
    registry.register(ToolDefinition::new(
        "delete_file",
        "Delete a file from the workspace sandbox",
        "relative path, e.g. output/old.txt",
        Arc::new(DeleteFileTool),
    ));
    registry.register(ToolDefinition::new(
        "execute_shell",
        "Run a shell command inside the workspace sandbox",
        "the command line, e.g. python3 code/main.py",
        Arc::new(ExecuteShellTool {
            scanner: scanner.clone(),
        }),
    ));
    registry.register(ToolDefinition::new(
        "run_code",
        "Write a code snippet into the sandbox and run it",
        "language, '::', then source, e.g. python :: print(2 + 2)",
        Arc::new(RunCodeTool { scanner }),
    ));
}

const UNAVAILABLE: &str =
    "Sandbox is not available for this run. File and shell tools cannot be used.";

/// Split `path :: content` on the first separator.
fn split_payload(input: &str) -> Option<(&str, &str)> {
    input
        .split_once("::")
        .map(|(head, tail)| (head.trim(), tail.trim()))
}

fn format_listing(entries: &[FileInfo]) -> String {
    if entries.is_empty() {
        return "(empty)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            if e.is_directory {
                format!("{}/", e.relative_path)
            } else {
                format!("{} ({} bytes)", e.relative_path, e.size_bytes)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_execution(result: &ExecutionResult) -> String {
    let mut out = String::new();
    if let Some(error) = &result.error {
        out.push_str(&format!("Execution error: {error}\n"));
    }
    match result.exit_code {
        Some(code) => out.push_str(&format!("Exit code: {code}\n")),
        None => out.push_str("Exit code: none (terminated)\n"),
    }
    if !result.stdout.is_empty() {
        out.push_str(&format!("stdout:\n{}\n", result.stdout));
    }
    if !result.stderr.is_empty() {
        out.push_str(&format!("stderr:\n{}\n", result.stderr));
    }
    if result.stdout.is_empty() && result.stderr.is_empty() {
        out.push_str("(no output)\n");
    }
    out.trim_end().to_string()
}

struct WriteFileTool;

#[async_trait]
impl ToolHandler for WriteFileTool {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String> {
        let Some((path, content)) = split_payload(input) else {
            return Ok(
                "Invalid input: expected 'relative/path :: content' (separator '::' missing)"
                    .to_string(),
            );
        };
        match ctx {
            ToolContext::Local {
                workspace_id,
                sandbox,
            } => {
                sandbox.write_file(workspace_id, path, content)?;
                Ok(format!("Wrote {} bytes to {path}", content.len()))
            }
            ToolContext::Remote {
                workspace_id,
                node_id,
                delegate,
            } => {
                delegate
                    .write_file(node_id, workspace_id, path, content)
                    .await?;
                Ok(format!("Wrote {} bytes to {path}", content.len()))
            }
            ToolContext::Unavailable => Ok(UNAVAILABLE.to_string()),
        }
    }
}

struct ReadFileTool;

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String> {
        let path = input.trim();
        if path.is_empty() {
            return Ok("Invalid input: expected a relative file path".to_string());
        }
        match ctx {
            ToolContext::Local {
                workspace_id,
                sandbox,
            } => Ok(sandbox.read_file(workspace_id, path)?),
            ToolContext::Remote {
                workspace_id,
                node_id,
                delegate,
            } => delegate.read_file(node_id, workspace_id, path).await,
            ToolContext::Unavailable => Ok(UNAVAILABLE.to_string()),
        }
    }
}

struct ListFilesTool;

#[async_trait]
impl ToolHandler for ListFilesTool {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String> {
        let dir = match input.trim() {
            "" | "." | "/" => None,
            d => Some(d),
        };
        let entries = match ctx {
            ToolContext::Local {
                workspace_id,
                sandbox,
            } => sandbox.list_files(workspace_id, dir)?,
            ToolContext::Remote {
                workspace_id,
                node_id,
                delegate,
            } => delegate.list_files(node_id, workspace_id, dir).await?,
            ToolContext::Unavailable => return Ok(UNAVAILABLE.to_string()),
        };
        Ok(format_listing(&entries))
    }
}

struct DeleteFileTool;

#[async_trait]
impl ToolHandler for DeleteFileTool {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String> {
        let path = input.trim();
        if path.is_empty() {
            return Ok("Invalid input: expected a relative file path".to_string());
        }
        match ctx {
            ToolContext::Local {
                workspace_id,
                sandbox,
            } => {
                sandbox.delete_file(workspace_id, path)?;
                Ok(format!("Deleted {path}"))
            }
            ToolContext::Remote {
                workspace_id,
                node_id,
                delegate,
            } => {
                delegate.delete_file(node_id, workspace_id, path).await?;
                Ok(format!("Deleted {path}"))
            }
            ToolContext::Unavailable => Ok(UNAVAILABLE.to_string()),
        }
    }
}

struct ExecuteShellTool {
    scanner: Arc<ThreatScanner>,
}

#[async_trait]
impl ToolHandler for ExecuteShellTool {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String> {
        let command = input.trim();
        if command.is_empty() {
            return Ok("Invalid input: expected a shell command".to_string());
        }
        if let Some(refusal) = scan_command(&self.scanner, command) {
            return Ok(refusal);
        }
        run_in_sandbox(ctx, command).await
    }
}

struct RunCodeTool {
    scanner: Arc<ThreatScanner>,
}

#[async_trait]
impl ToolHandler for RunCodeTool {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String> {
        let Some((language, source)) = split_payload(input) else {
            return Ok(
                "Invalid input: expected 'language :: source' (separator '::' missing)"
                    .to_string(),
            );
        };
        let Some((extension, interpreter)) = interpreter_for(language) else {
            return Ok(format!(
                "Unsupported language '{language}'. Supported: python, javascript, bash"
            ));
        };
        if let Some(refusal) = scan_command(&self.scanner, source) {
            return Ok(refusal);
        }

        let snippet_path = format!("code/snippet.{extension}");
        match ctx {
            ToolContext::Local {
                workspace_id,
                sandbox,
            } => sandbox.write_file(workspace_id, &snippet_path, source)?,
            ToolContext::Remote {
                workspace_id,
                node_id,
                delegate,
            } => {
                delegate
                    .write_file(node_id, workspace_id, &snippet_path, source)
                    .await?
            }
            ToolContext::Unavailable => return Ok(UNAVAILABLE.to_string()),
        }

        run_in_sandbox(ctx, &format!("{interpreter} {snippet_path}")).await
    }
}

/// Map a language name onto a snippet extension and interpreter command.
fn interpreter_for(language: &str) -> Option<(&'static str, &'static str)> {
    match language.to_lowercase().as_str() {
        "python" | "python3" | "py" => Some(("py", "python3")),
        "javascript" | "js" | "node" => Some(("js", "node")),
        "bash" | "sh" | "shell" => Some(("sh", "bash")),
        _ => None,
    }
}

/// Point-of-use scan. Returns refusal text when the command carries a
/// blocking threat.
fn scan_command(scanner: &ThreatScanner, command: &str) -> Option<String> {
    let result = scanner.scan(command);
    if result.has_blocking_threat() {
        warn!(
            event = "tools.command_refused",
            threats = result.threats.len(),
            "shell command refused by threat scan"
        );
        return Some(format!(
            "Command refused by security scan: {}",
            result.summary
        ));
    }
    None
}

async fn run_in_sandbox(ctx: &ToolContext, command: &str) -> Result<String> {
    let result = match ctx {
        ToolContext::Local {
            workspace_id,
            sandbox,
        } => sandbox.execute(workspace_id, command, None).await?,
        ToolContext::Remote {
            workspace_id,
            node_id,
            delegate,
        } => {
            delegate
                .execute(node_id, workspace_id, command, None)
                .await?
        }
        ToolContext::Unavailable => return Ok(UNAVAILABLE.to_string()),
    };
    Ok(format_execution(&result))
}
