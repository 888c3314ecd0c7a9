//! GridAgent execution core.
//!
//! The per-node engine that turns a goal into sandboxed work: a threat
//! scanner gates goals and tool inputs, a workspace sandbox jails file
//! and shell access, a tool registry dispatches model-chosen actions,
//! and an agent runtime drives one of three reasoning strategies over
//! an LLM collaborator.

pub mod agent;
pub mod cas;
pub mod llm;
pub mod sandbox;
pub mod security;
pub mod telemetry;
pub mod tools;

pub use agent::{
    ActionKind, AgentAction, AgentRunRequest, AgentRunResponse, AgentRuntime, AgentStrategy,
    CancelHandle, ProgressEvent, RunStatus,
};

pub use cas::{ContentId, ContentStore, FsContentStore};

pub use llm::{
    AnthropicClient, ChatMessage, FnLlmClient, LlmClient, LlmRequest, LlmResponse,
    OpenAiCompatClient, ProviderRouter,
};

pub use sandbox::{
    check_command, ExecutionResult, FileInfo, Manifest, SandboxConfig, SandboxError, SandboxStore,
};

pub use security::{RiskLevel, ScanResult, ThreatCategory, ThreatMatch, ThreatPattern, ThreatScanner};

pub use telemetry::init_tracing;

pub use tools::{
    register_local_tools, register_reasoning_tools, register_sandbox_tools, SandboxDelegate,
    ToolContext, ToolDefinition, ToolRegistry,
};

/// Crate version, for handshake and diagnostics output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
