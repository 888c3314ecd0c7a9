//! Gated subprocess execution inside the sandbox jail.
//!
//! Commands are screened against an independent blocked-command catalog
//! before any subprocess is spawned; a match is an outright refusal. The
//! child runs with its working directory pinned to the sandbox root, a
//! narrowed environment that redirects HOME and TMPDIR into the jail, a
//! bounded output buffer, and a hard wall-clock timeout.

use std::fs;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use super::error::{SandboxError, SandboxResult};
use super::store::{ExecutionResult, SandboxStore};

/// Blocked-command rules: name + pattern. Independent of the threat
/// scanner catalog so sandbox execution stays safe outside the agent.
const BLOCKED_COMMAND_SPECS: &[(&str, &str)] = &[
    ("privilege_escalation", r"(?i)\b(?:sudo|su)\b"),
    (
        "recursive_root_delete",
        r"(?i)\brm\s+(?:-[a-zA-Z-]+\s+)*-(?:rf|fr)\w*\s+(?:/|~|\$HOME)",
    ),
    ("filesystem_format", r"(?i)\bmkfs(?:\.\w+)?\b"),
    ("raw_device_write", r"(?i)\bdd\s+[^\n]*\bof=/dev/"),
    ("fork_bomb", r":\(\)\s*\{\s*:\|:&\s*\}\s*;?\s*:"),
    (
        "pipe_to_shell",
        r"(?i)\b(?:curl|wget)\b[^\n|;]*\|\s*(?:ba|z|fi)?sh\b",
    ),
    (
        "system_power",
        r"(?i)\b(?:shutdown|reboot|poweroff|halt)\b",
    ),
    ("windows_format", r"(?i)\bformat\s+[a-z]:"),
    ("windows_recursive_delete", r"(?i)\b(?:del|rd)\s+/s\b"),
];

fn blocked_commands() -> &'static Vec<(String, Regex)> {
    static RULES: OnceLock<Vec<(String, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        BLOCKED_COMMAND_SPECS
            .iter()
            .filter_map(|(name, pattern)| {
                Regex::new(pattern).ok().map(|re| (name.to_string(), re))
            })
            .collect()
    })
}

/// Check a raw command string against the blocked-command catalog.
pub fn check_command(command: &str) -> SandboxResult<()> {
    for (name, re) in blocked_commands() {
        if re.is_match(command) {
            return Err(SandboxError::BlockedCommand {
                pattern: name.clone(),
            });
        }
    }
    Ok(())
}

impl SandboxStore {
    /// Run a shell command inside the workspace sandbox.
    ///
    /// A blocked-command match refuses before any spawn. A non-zero exit
    /// is reported as `success: false` with captured output, not as an
    /// `Err`. Output is read incrementally; crossing `max_output_bytes`
    /// kills the child and is reported via `error`, as is a timeout.
    pub async fn execute(
        &self,
        workspace_id: &str,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> SandboxResult<ExecutionResult> {
        check_command(command)?;
        let root = self.ensure(workspace_id)?;

        let tmp_dir = root.join(".tmp");
        fs::create_dir_all(&tmp_dir)?;

        let timeout = Duration::from_millis(timeout_ms.unwrap_or(self.config().default_timeout_ms));
        let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".into());

        debug!(
            event = "sandbox.exec",
            workspace_id = %workspace_id,
            command = %command,
            timeout_ms = timeout.as_millis() as u64,
        );

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&root)
            .env_clear()
            .env("PATH", path)
            .env("HOME", &root)
            .env("TMPDIR", &tmp_dir)
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (stdout_pipe, stderr_pipe) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                // kill_on_drop reaps the child on return.
                return Ok(ExecutionResult {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    error: Some("failed to capture process output".to_string()),
                });
            }
        };

        let cap = self.config().max_output_bytes;
        let outcome = tokio::time::timeout(timeout, async {
            let (stdout_buf, stderr_buf, exceeded) =
                drain_capped(stdout_pipe, stderr_pipe, cap).await;
            if exceeded {
                return (stdout_buf, stderr_buf, true, None);
            }
            let status = child.wait().await.ok();
            (stdout_buf, stderr_buf, false, status)
        })
        .await;

        match outcome {
            Ok((stdout_buf, stderr_buf, true, _)) => {
                let _ = child.kill().await;
                warn!(
                    event = "sandbox.exec_output_overflow",
                    workspace_id = %workspace_id,
                    cap_bytes = cap as u64,
                );
                Ok(ExecutionResult {
                    success: false,
                    stdout: truncate_lossy(&stdout_buf, cap),
                    stderr: truncate_lossy(&stderr_buf, cap),
                    exit_code: None,
                    error: Some(format!(
                        "output exceeded {cap} bytes, command terminated"
                    )),
                })
            }
            Ok((stdout_buf, stderr_buf, false, Some(status))) => Ok(ExecutionResult {
                success: status.success(),
                stdout: truncate_lossy(&stdout_buf, cap),
                stderr: truncate_lossy(&stderr_buf, cap),
                exit_code: status.code(),
                error: None,
            }),
            Ok((stdout_buf, stderr_buf, false, None)) => Ok(ExecutionResult {
                success: false,
                stdout: truncate_lossy(&stdout_buf, cap),
                stderr: truncate_lossy(&stderr_buf, cap),
                exit_code: None,
                error: Some("failed to collect process exit status".to_string()),
            }),
            Err(_) => {
                let _ = child.kill().await;
                warn!(
                    event = "sandbox.exec_timeout",
                    workspace_id = %workspace_id,
                    timeout_ms = timeout.as_millis() as u64,
                );
                Ok(ExecutionResult {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    error: Some(format!(
                        "command timed out after {}ms",
                        timeout.as_millis()
                    )),
                })
            }
        }
    }
}

/// Read both pipes until EOF or until either stream's capture crosses
/// `cap`. Returns (stdout, stderr, exceeded); when exceeded the caller
/// must kill the child, which is still running with a full pipe.
pub(crate) async fn drain_capped(
    mut stdout: tokio::process::ChildStdout,
    mut stderr: tokio::process::ChildStderr,
    cap: usize,
) -> (Vec<u8>, Vec<u8>, bool) {
    use tokio::io::AsyncReadExt;

    let mut stdout_buf: Vec<u8> = Vec::new();
    let mut stderr_buf: Vec<u8> = Vec::new();
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut stdout_chunk = [0u8; 8192];
    let mut stderr_chunk = [0u8; 8192];

    while stdout_open || stderr_open {
        let exceeded = tokio::select! {
            read = stdout.read(&mut stdout_chunk), if stdout_open => match read {
                Ok(0) | Err(_) => {
                    stdout_open = false;
                    false
                }
                Ok(n) => {
                    stdout_buf.extend_from_slice(&stdout_chunk[..n]);
                    stdout_buf.len() > cap
                }
            },
            read = stderr.read(&mut stderr_chunk), if stderr_open => match read {
                Ok(0) | Err(_) => {
                    stderr_open = false;
                    false
                }
                Ok(n) => {
                    stderr_buf.extend_from_slice(&stderr_chunk[..n]);
                    stderr_buf.len() > cap
                }
            },
        };
        if exceeded {
            return (stdout_buf, stderr_buf, true);
        }
    }
    (stdout_buf, stderr_buf, false)
}

fn truncate_lossy(bytes: &[u8], cap: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= cap {
        return text.into_owned();
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n[output truncated at {} bytes]", &text[..cut], cap)
}
