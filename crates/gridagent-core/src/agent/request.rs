//! Run requests, responses, and the action trace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;
use crate::tools::ToolContext;

/// Control-flow strategy driving one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStrategy {
    /// Think/act/observe loop until a finish action or the iteration cap.
    React,
    /// One planning call, step-by-step execution, one summarization call.
    PlanExecute,
    /// Exactly one completion; tools are documentation only.
    Simple,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    MaxIterations,
    Error,
    Blocked,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::MaxIterations => "max_iterations",
            Self::Error => "error",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What one trace entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A reply that named and dispatched a tool.
    ToolCall,
    /// A reply with no tool named.
    Thought,
    /// An action or plan step refused by the threat scanner.
    SecurityBlock,
    /// One executed step of a plan.
    PlanStep,
    /// The terminating finish action.
    Finish,
}

/// One entry of the per-run action trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub iteration: u32,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// One agent run: the goal plus everything that shapes its execution.
///
/// Built with the builder methods; defaults are a reactive run with ten
/// iterations, security on, and no sandbox context.
#[derive(Clone)]
pub struct AgentRunRequest {
    pub goal: String,
    pub strategy: AgentStrategy,
    pub model: String,
    /// Explicit provider name; `None` lets the router's heuristics decide.
    pub provider: Option<String>,
    /// Restrict the run to these tools; `None` exposes the whole registry.
    pub allowed_tools: Option<Vec<String>>,
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub security_enabled: bool,
    /// Where sandbox tools send their work for this run.
    pub context: ToolContext,
    /// Bypass the runtime's configured client, e.g. for remote routing.
    pub llm_override: Option<Arc<dyn LlmClient>>,
}

impl AgentRunRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            strategy: AgentStrategy::React,
            model: "claude-sonnet-4-5".into(),
            provider: None,
            allowed_tools: None,
            max_iterations: 10,
            max_tokens: 4096,
            temperature: 0.7,
            security_enabled: true,
            context: ToolContext::Unavailable,
            llm_override: None,
        }
    }

    pub fn with_strategy(mut self, strategy: AgentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn with_max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = cap;
        self
    }

    pub fn with_security(mut self, enabled: bool) -> Self {
        self.security_enabled = enabled;
        self
    }

    pub fn with_context(mut self, context: ToolContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_llm_override(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_override = Some(client);
        self
    }
}

/// Final result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResponse {
    pub result: String,
    pub status: RunStatus,
    pub iterations: u32,
    pub trace: Vec<AgentAction>,
    /// Sum of generated-token counts across every completion in the run.
    pub tokens_used: u32,
    pub security_alerts: Vec<String>,
}

/// Caller-side switch to stop a run at the next iteration boundary.
///
/// Cancellation never rolls back a tool call already in flight.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = AgentRunRequest::new("do a thing");
        assert_eq!(request.strategy, AgentStrategy::React);
        assert_eq!(request.max_iterations, 10);
        assert!(request.security_enabled);
        assert!(request.llm_override.is_none());
        assert!(!request.context.is_available());
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::MaxIterations).unwrap(),
            "\"max_iterations\""
        );
        assert_eq!(RunStatus::Blocked.to_string(), "blocked");
        let parsed: AgentStrategy = serde_json::from_str("\"plan_execute\"").unwrap();
        assert_eq!(parsed, AgentStrategy::PlanExecute);
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_action_trace_serialization_skips_empty() {
        let action = AgentAction {
            iteration: 1,
            kind: ActionKind::Thought,
            thought: Some("hmm".into()),
            tool: None,
            input: None,
            observation: None,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "thought");
        assert!(json.get("tool").is_none());
    }
}
