//! Agent runtime — strategy-driven goal execution over the tool registry.
//!
//! One [`AgentRuntime`] serves many concurrent runs; scanner, registry,
//! and LLM client are injected at construction. Each run scans its goal,
//! picks a strategy, and loops LLM reasoning against tool observations
//! until it terminates with a [`RunStatus`].
//!
//! # Modules
//!
//! - [`request`]  — run requests, responses, action trace, cancellation
//! - [`parse`]    — reply parsing and plan-step extraction
//! - [`progress`] — per-iteration progress events
//! - [`runtime`]  — the three strategies and the run driver

pub mod parse;
pub mod progress;
pub mod request;
pub mod runtime;

pub use parse::{extract_plan_steps, parse_reply, ParsedReply};
pub use progress::{ProgressChannel, ProgressEvent};
pub use request::{
    ActionKind, AgentAction, AgentRunRequest, AgentRunResponse, AgentStrategy, CancelHandle,
    RunStatus,
};
pub use runtime::AgentRuntime;
