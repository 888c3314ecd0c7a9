//! Sandbox: per-workspace filesystem jail with gated command execution.
//!
//! Each workspace gets an isolated subtree of the host filesystem; no
//! validated operation can read, write, or execute outside it regardless
//! of attacker-supplied paths or commands. Writes are subject to an
//! extension allow-list and an advisory storage quota; commands are
//! screened against a blocked-command catalog before any spawn.
//!
//! # Modules
//!
//! - [`validate`] — workspace id / relative path / write target rules
//! - [`store`]    — `SandboxStore`, `SandboxConfig`, `SandboxMeta`, `FileInfo`
//! - [`exec`]     — `execute()` + blocked-command catalog
//! - [`sync`]     — manifest-based whole-tree sync via [`crate::cas`]
//! - [`error`]    — `SandboxError` / `SandboxResult`

pub mod error;
pub mod exec;
pub mod store;
pub mod sync;
pub mod validate;

pub use error::{SandboxError, SandboxResult};
pub use exec::check_command;
pub use store::{ExecutionResult, FileInfo, SandboxConfig, SandboxMeta, SandboxStore};
pub use sync::Manifest;
