//! Built-in threat pattern catalog.
//!
//! Patterns are grouped by category: destructive filesystem operations,
//! remote-code-execution idioms, credential exfiltration, persistence,
//! reverse shells, privilege escalation, command-injection tricks, and
//! prompt-injection phrasing. Severity is assigned per pattern; the
//! scanner blocks on High/Critical only.

use super::pattern::{RiskLevel, ThreatCategory, ThreatPattern};

/// Build the default pattern catalog.
///
/// All patterns here are developer-authored constants; a pattern that fails
/// to compile is dropped (guarded by `test_catalog_compiles_completely`).
pub fn default_catalog() -> Vec<ThreatPattern> {
    use RiskLevel::*;
    use ThreatCategory::*;

    let specs: &[(&str, &str, &str, RiskLevel, ThreatCategory)] = &[
        // ── Destructive filesystem operations ─────────────
        (
            "rm_recursive_root",
            r"(?i)\brm\s+(?:-[a-zA-Z-]+\s+)*-(?:rf|fr)\w*\s+(?:/|~|\$HOME)",
            "recursive forced delete of root or home",
            Critical,
            Filesystem,
        ),
        (
            "mkfs",
            r"(?i)\bmkfs(?:\.\w+)?\s",
            "filesystem creation wipes the target device",
            Critical,
            Filesystem,
        ),
        (
            "dd_block_device",
            r"(?i)\bdd\s+[^\n]*\bof=/dev/(?:sd|hd|nvme|mmcblk)",
            "raw write to a block device",
            Critical,
            Filesystem,
        ),
        (
            "fork_bomb",
            r":\(\)\s*\{\s*:\|:&\s*\}\s*;?\s*:",
            "shell fork bomb",
            Critical,
            Filesystem,
        ),
        (
            "chmod_world_writable",
            r"(?i)\bchmod\s+(?:-[a-zA-Z]+\s+)*777\b",
            "world-writable permission change",
            Medium,
            Filesystem,
        ),
        // ── Remote code execution ─────────────────────────
        (
            "pipe_to_shell",
            r"(?i)\b(?:curl|wget)\b[^\n|;]*\|\s*(?:sudo\s+)?(?:ba|z|fi)?sh\b",
            "download piped directly into a shell",
            Critical,
            RemoteExecution,
        ),
        (
            "base64_pipe_shell",
            r"(?i)\bbase64\s+(?:-d|--decode)\b[^\n]*\|\s*(?:ba)?sh\b",
            "base64-decoded payload piped into a shell",
            High,
            CommandInjection,
        ),
        (
            "eval_remote_payload",
            r#"(?i)\beval\s+["'$(]*(?:curl|wget|echo)"#,
            "eval over a downloaded or encoded payload",
            High,
            CommandInjection,
        ),
        // ── Credential / data exfiltration ────────────────
        (
            "shadow_file_access",
            r"(?i)\b(?:cat|less|more|head|tail|cp|scp|base64)\s+[^\n]*/etc/shadow",
            "reads the system password hash file",
            Critical,
            Exfiltration,
        ),
        (
            "ssh_key_access",
            r"(?i)\.ssh/(?:id_[a-z0-9]+|authorized_keys)",
            "touches SSH private keys or authorized_keys",
            High,
            Exfiltration,
        ),
        (
            "cloud_credentials_access",
            r"(?i)\.aws/credentials|\.config/gcloud",
            "touches cloud provider credential files",
            High,
            Exfiltration,
        ),
        (
            "env_exfiltration",
            r"(?i)\b(?:env|printenv)\b[^\n]*\|\s*(?:curl|wget|nc)\b",
            "environment variables piped to the network",
            High,
            Exfiltration,
        ),
        // ── Persistence ───────────────────────────────────
        (
            "cron_persistence",
            r"(?i)\|\s*crontab\b|\bcrontab\s+/",
            "installs a crontab entry",
            High,
            Persistence,
        ),
        (
            "service_persistence",
            r"(?i)\bsystemctl\s+enable\b|/etc/init\.d/",
            "installs or enables a system service",
            High,
            Persistence,
        ),
        // ── Reverse shells and listeners ──────────────────
        (
            "dev_tcp_reverse_shell",
            r"(?i)\b(?:bash|sh)\s+-i\s+>&\s*/dev/tcp/",
            "interactive shell redirected over /dev/tcp",
            Critical,
            ReverseShell,
        ),
        (
            "netcat_exec_shell",
            r"(?i)\bnc(?:at)?\s+[^\n]*-e\s*(?:/bin/)?(?:ba)?sh\b",
            "netcat spawning a shell",
            Critical,
            ReverseShell,
        ),
        (
            "socat_exec_shell",
            r"(?i)\bsocat\s+[^\n]*\bexec:",
            "socat exec bridge",
            Critical,
            ReverseShell,
        ),
        (
            "python_pty_shell",
            r"(?i)\bpython[23]?\s+-c\s+[^\n]*pty\.spawn",
            "python pty shell spawn",
            Critical,
            ReverseShell,
        ),
        (
            "netcat_listener",
            r"(?i)\bnc(?:at)?\s+-l\b[^\n]*?-p\s*\d+",
            "netcat listener",
            High,
            ReverseShell,
        ),
        // ── Privilege escalation ──────────────────────────
        (
            "sudo_root_shell",
            r"(?i)\bsudo\s+(?:su\b|-i\b|/bin/(?:ba)?sh)|\bsu\s+root\b",
            "escalates to a root shell",
            High,
            PrivilegeEscalation,
        ),
        (
            "setuid_bit",
            r"(?i)\bchmod\s+(?:u\+s|[24][0-7]{3})\s",
            "sets the setuid/setgid bit",
            High,
            PrivilegeEscalation,
        ),
        // ── Prompt injection ──────────────────────────────
        (
            "instruction_override",
            r"(?i)ignore\s+(?:all\s+)?(?:previous|prior|above)\s+(?:instructions|prompts|rules)",
            "asks the model to ignore its instructions",
            High,
            PromptInjection,
        ),
        (
            "disregard_rules",
            r"(?i)disregard\s+(?:your|all|the)\s+(?:rules|instructions|guidelines)",
            "asks the model to disregard its rules",
            High,
            PromptInjection,
        ),
        (
            "new_instructions_injection",
            r"(?i)your\s+new\s+instructions\s+are|forget\s+(?:everything|all)\s+(?:you|above)",
            "attempts to replace the system instructions",
            High,
            PromptInjection,
        ),
        (
            "role_override",
            r"(?i)\byou\s+are\s+now\s+(?:a|an|the)\b",
            "attempts to override the assistant role",
            Medium,
            PromptInjection,
        ),
        (
            "jailbreak_phrasing",
            r"(?i)\bjailbr(?:eak|oken)\b|\bDAN\s+mode\b|\bdeveloper\s+mode\s+enabled\b",
            "known jailbreak phrasing",
            High,
            PromptInjection,
        ),
        (
            "system_prompt_probe",
            r"(?i)\b(?:reveal|show|print|repeat)\s+(?:your\s+)?(?:system\s+prompt|initial\s+instructions)",
            "probes for the system prompt",
            Medium,
            PromptInjection,
        ),
        // ── Misc ──────────────────────────────────────────
        (
            "history_wipe",
            r"(?i)\bhistory\s+-c\b|\bshred\s+[^\n]*history",
            "clears shell history",
            Medium,
            Custom("anti_forensics".into()),
        ),
    ];

    specs
        .iter()
        .filter_map(|(name, pattern, desc, risk, category)| {
            ThreatPattern::new(*name, pattern, *desc, *risk, category.clone())
        })
        .collect()
}

/// Number of patterns the default catalog is expected to contain.
#[cfg(test)]
const EXPECTED_CATALOG_LEN: usize = 28;
