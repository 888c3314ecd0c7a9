//! Tool registry: dynamic mapping from tool name to a callable contract.
//!
//! Three disjoint families are registered under different conditions:
//! reasoning tools (always), sandbox tools (once an execution context can
//! carry them), and local host tools (trusted operation only). Identity
//! is the lower-cased name with last-write-wins on collision; dispatch
//! never panics and converts every failure into observation text the
//! agent loop can reason over.
//!
//! # Modules
//!
//! - [`context`]       — `ToolContext` (Local | Remote | Unavailable), `SandboxDelegate`
//! - [`reasoning`]     — think / web_search stub / calculator
//! - [`sandbox_tools`] — file CRUD, shell execute, run_code
//! - [`local`]         — unsandboxed host tools for trusted operation

pub mod context;
pub mod local;
pub mod reasoning;
pub mod sandbox_tools;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

pub use context::{SandboxDelegate, ToolContext};
pub use local::register_local_tools;
pub use reasoning::register_reasoning_tools;
pub use sandbox_tools::register_sandbox_tools;

/// Callable contract for one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: &str, ctx: &ToolContext) -> Result<String>;
}

/// A registered tool: name, prompt-facing documentation, handler.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Human-readable parameter shape shown to the model.
    pub parameters: String,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: parameters.into(),
            handler,
        }
    }
}

/// Mapping from lower-cased tool name to [`ToolDefinition`].
///
/// Registration is the only mutation path; lookups are read-only during a
/// run, so a registry can be shared across concurrent runs via `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, definition: ToolDefinition) {
        let key = definition.name.to_lowercase();
        debug!(event = "tools.registered", tool = %key);
        self.tools.insert(key, definition);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Prompt-facing documentation block, one line per tool.
    pub fn descriptions_block(&self, allowed: Option<&[String]>) -> String {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .filter(|t| match allowed {
                Some(list) => list.iter().any(|a| a.eq_ignore_ascii_case(&t.name)),
                None => true,
            })
            .map(|t| format!("- {}: {} (input: {})", t.name, t.description, t.parameters))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// Execute a tool by name, returning observation text.
    ///
    /// Unknown names yield a message starting with `not found`; handler
    /// failures become descriptive text rather than errors, so an agent
    /// loop can always continue reasoning.
    pub async fn dispatch(&self, name: &str, raw_input: &str, ctx: &ToolContext) -> String {
        let Some(tool) = self.get(name) else {
            return format!(
                "not found: no tool named '{}'. Available tools: {}",
                name.trim(),
                self.names().join(", ")
            );
        };

        let input = normalize_input(raw_input);
        match tool.handler.call(&input, ctx).await {
            Ok(output) => output,
            Err(e) => format!("Error executing {}: {e}", tool.name),
        }
    }
}

/// Trim and strip a single layer of symmetric quoting.
fn normalize_input(raw: &str) -> String {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}
