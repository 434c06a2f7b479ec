//! Orchestrator (C11) — the top-level model/tool iteration loop.
//!
//! [`Orchestrator::process`] is the state machine from spec §4.11: build
//! the outgoing request, call the provider, classify any error, extract
//! and validate tool calls, execute them in classified order, and repeat
//! until the model returns a final answer, a bound is hit, or the user
//! interrupts. Every other module in this crate exists to be called from
//! here: sanitizer before every send, trimmer when the request is too
//! big, retry policy on every provider error, executor once calls are
//! validated, interrupt controller between suspension points.

use crate::config::CoreConfig;
use crate::executor;
use crate::extractor;
use crate::interrupt::InterruptController;
use crate::provider::{Provider, ProviderErrorType, StreamSink};
use crate::retry::{ErrorClass, RetryDecision, RetryTracker};
use crate::sanitizer;
use crate::session::{Message, Role, Session, ToolCall, ToolResult};
use crate::tools::{Concurrency, ToolRegistry};
use crate::trimmer::{self, EscalationRung};
use crate::ui::{ChunkMetrics, Ui};
use std::sync::Arc;
use std::time::Duration;

/// What one call to [`Orchestrator::process`] produced.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub success: bool,
    pub content: String,
    pub iterations: usize,
    pub tool_calls_made: Vec<ToolCall>,
    /// Set on any non-success outcome: iteration bound, session error
    /// budget, circuit breaker, or an explicit terminal provider error.
    pub error: Option<String>,
}

impl TurnResult {
    fn terminal(content: impl Into<String>, iterations: usize, tool_calls_made: Vec<ToolCall>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
            iterations,
            tool_calls_made,
            error: Some(error.into()),
        }
    }

    fn success(content: impl Into<String>, iterations: usize, tool_calls_made: Vec<ToolCall>) -> Self {
        Self {
            success: true,
            content: content.into(),
            iterations,
            tool_calls_made,
            error: None,
        }
    }
}

pub struct Orchestrator {
    config: CoreConfig,
    registry: ToolRegistry,
    provider: Arc<dyn Provider>,
    ui: Arc<dyn Ui>,
    interrupt: InterruptController,
}

/// How far up the token-limit escalation ladder (§4.8 step 3) this turn
/// has climbed so far. Distinct from the proactive per-iteration trim,
/// which always runs at whatever the current rung implies.
#[derive(Default)]
struct EscalationState {
    rung: Option<EscalationRung>,
    attempts: u32,
}

impl Orchestrator {
    pub fn new(config: CoreConfig, registry: ToolRegistry, provider: Arc<dyn Provider>, ui: Arc<dyn Ui>) -> Self {
        Self {
            config,
            registry,
            provider,
            ui,
            interrupt: InterruptController::new(),
        }
    }

    /// Expose the interrupt flag so a caller (e.g. a terminal input
    /// reader running on another task) can trip it independently of the
    /// polling this loop already does during streaming.
    pub fn interrupt_controller(&self) -> InterruptController {
        self.interrupt.clone()
    }

    fn map_error_class(error_type: Option<ProviderErrorType>) -> ErrorClass {
        match error_type {
            Some(ProviderErrorType::RateLimit) => ErrorClass::RateLimit,
            Some(ProviderErrorType::ServerError) => ErrorClass::ServerError,
            Some(ProviderErrorType::TokenLimitExceeded) => ErrorClass::TokenLimit,
            Some(ProviderErrorType::MalformedToolJson) => ErrorClass::MalformedToolJson,
            Some(ProviderErrorType::MessageStructureError) => ErrorClass::MessageStructureError,
            _ => ErrorClass::NonRetryable,
        }
    }

    /// Build the outgoing request: system prompt, injected context files,
    /// the trimmed conversation history, under whatever escalation rung
    /// is currently active (S0/S2, §4.8). This never mutates the
    /// session's canonical log — only the payload sent to the provider.
    fn build_outgoing(&self, session: &Session, escalation: &EscalationState) -> Vec<Message> {
        let mut out = vec![Message::system(self.config.system_prompt())];
        for path in &session.context_files {
            out.push(Message::user(format!(
                "Context file `{}`:\n{}",
                path.display(),
                std::fs::read_to_string(path).unwrap_or_else(|e| format!("<unreadable: {e}>"))
            )));
        }

        let history = session.messages();
        let trimmed = match escalation.rung {
            Some(rung) => trimmer::escalate(history, rung),
            None => {
                let safe = self.config.safe_token_threshold();
                trimmer::trim(history, safe, crate::TRIM_RECENT_WINDOW)
            }
        };
        out.extend(trimmed);
        out
    }

    /// Append the canonical interrupt-recovery message (spec §4.10): a
    /// *user*-role instruction, never synthetic system text, so role
    /// alternation isn't violated and the model sees it as something the
    /// person actually said.
    fn handle_interrupt(&self, session: &mut Session) -> crate::Result<()> {
        self.interrupt.acknowledge();
        session.interrupted = true;
        session.append(Message::user(
            "[interrupted] Stop what you're doing. Summarize what's been done so far, \
             then use the ask_user tool to check in with me before continuing.",
        ))?;
        session.save()?;
        Ok(())
    }

    /// S0-S7: run one user turn to completion.
    pub async fn process(&self, user_input: &str, session: &mut Session) -> crate::Result<TurnResult> {
        // S0 Init
        session.snapshot();
        self.interrupt.acknowledge();
        session
            .append(Message::user(user_input).with_importance(
                if session.messages().iter().all(|m| m.role != Role::User) {
                    crate::ANCHOR_IMPORTANCE
                } else {
                    0.0
                },
            ))?;
        session.save()?;

        let mut iteration = 0usize;
        let mut retry_tracker = RetryTracker::new();
        let mut escalation = EscalationState::default();
        let mut all_tool_calls: Vec<ToolCall> = Vec::new();
        let descriptors = self.registry.descriptors_for_provider(self.config.is_subagent);

        loop {
            // S1 Iterate
            iteration += 1;
            if iteration > self.config.max_iterations {
                return Ok(TurnResult::terminal(
                    String::new(),
                    iteration - 1,
                    all_tool_calls,
                    format!("iteration bound ({}) exceeded", self.config.max_iterations),
                ));
            }

            if self.interrupt.pending() {
                self.handle_interrupt(session)?;
                continue;
            }

            // S2 Send
            let outgoing = self.build_outgoing(session, &escalation);
            let (sanitized, _repair_report) = sanitizer::sanitize(&outgoing, self.provider.supports_tool_role());

            let ui = Arc::clone(&self.ui);
            let chunk_count = std::sync::atomic::AtomicUsize::new(0);
            let total_chars = std::sync::atomic::AtomicUsize::new(0);
            let on_chunk = {
                let ui = Arc::clone(&ui);
                let interrupt = self.interrupt.clone();
                move |text: &str| {
                    // Cooperative ESC check (§4.10): a non-blocking poll on
                    // every chunk so a keypress mid-stream is caught before
                    // the provider call even finishes, not just between
                    // iterations.
                    let _ = interrupt.poll(Duration::from_millis(0));
                    let idx = chunk_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let total = total_chars.fetch_add(text.len(), std::sync::atomic::Ordering::SeqCst) + text.len();
                    ui.on_chunk(
                        text,
                        ChunkMetrics {
                            chunk_index: idx,
                            total_chars: total,
                        },
                    );
                }
            };
            let on_tool_call = {
                let ui = Arc::clone(&ui);
                move |name: &str| ui.on_tool_call(name)
            };
            let on_thinking = {
                let ui = Arc::clone(&ui);
                move |text: &str| ui.on_thinking(text)
            };

            let response = self
                .provider
                .send_streaming(
                    &sanitized,
                    &descriptors,
                    StreamSink {
                        on_chunk: &on_chunk,
                        on_tool_call: &on_tool_call,
                        on_thinking: &on_thinking,
                    },
                )
                .await;

            if self.interrupt.pending() {
                self.handle_interrupt(session)?;
                continue;
            }

            // S3 Classify error
            if let Some(error_msg) = &response.error {
                session.error_count += 1;
                if session.error_count > self.config.session_error_budget {
                    return Ok(TurnResult::terminal(
                        String::new(),
                        iteration,
                        all_tool_calls,
                        "session error budget exhausted",
                    ));
                }

                let class = Self::map_error_class(response.error_type);
                let decision = retry_tracker.record(class, error_msg, &self.config.retry_budgets);

                match (class, decision) {
                    (_, RetryDecision::CircuitBroken) => {
                        return Ok(TurnResult::terminal(
                            String::new(),
                            iteration,
                            all_tool_calls,
                            format!("repeated identical error: {error_msg}"),
                        ));
                    }
                    (ErrorClass::TokenLimit, RetryDecision::Retry) | (ErrorClass::TokenLimit, RetryDecision::BudgetExhausted) => {
                        let ladder = trimmer::escalation_ladder();
                        let next_idx = escalation.attempts as usize;
                        if next_idx >= ladder.len() {
                            return Ok(TurnResult::terminal(
                                String::new(),
                                iteration,
                                all_tool_calls,
                                "context window too small even after full escalation",
                            ));
                        }
                        escalation.rung = Some(ladder[next_idx]);
                        escalation.attempts += 1;
                        continue;
                    }
                    (ErrorClass::ServerError, RetryDecision::Retry) | (ErrorClass::RateLimit, RetryDecision::Retry) => {
                        let attempt = retry_tracker.attempts_for(class);
                        let wait = response
                            .retry_after
                            .unwrap_or_else(|| Duration::from_secs(2u64.saturating_pow(attempt.saturating_sub(1))));
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    (ErrorClass::MessageStructureError, RetryDecision::Retry) => {
                        session.load()?;
                        continue;
                    }
                    (ErrorClass::MalformedToolJson, RetryDecision::Retry) => {
                        let schema_hint = response
                            .failed_tool
                            .as_deref()
                            .and_then(|name| self.registry.get(name))
                            .map(|tool| format!("\nExpected schema for `{}`: {}", tool.name(), tool.parameters_schema()))
                            .unwrap_or_default();
                        session.append(Message::system(format!(
                            "Your previous response could not be parsed as a valid tool call: {error_msg}.{schema_hint} \
                             Please retry with corrected JSON."
                        )))?;
                        continue;
                    }
                    (ErrorClass::MalformedToolJson, RetryDecision::BudgetExhausted) => {
                        session.append(Message::system(
                            "Tool call JSON is still malformed after one retry. Try a different \
                             approach instead of repeating the same call.",
                        ))?;
                        retry_tracker = RetryTracker::new();
                        continue;
                    }
                    (_, RetryDecision::BudgetExhausted) if class != ErrorClass::NonRetryable => {
                        return Ok(TurnResult::terminal(
                            String::new(),
                            iteration,
                            all_tool_calls,
                            format!("{:?} retry budget exhausted: {error_msg}", class),
                        ));
                    }
                    _ => {
                        // Non-retryable: note it in the conversation and let
                        // the model react on the next iteration rather than
                        // failing the whole turn outright.
                        session.append(Message::system(format!("Provider error: {error_msg}")))?;
                        continue;
                    }
                }
            }

            // S4 Extract tool calls
            let extraction = extractor::extract(&response.content, response.tool_calls.as_deref());
            if extraction.calls.is_empty() {
                // S7 Finalize
                session.append(Message::assistant(response.content.clone()))?;
                session.save()?;
                return Ok(TurnResult::success(response.content, iteration, all_tool_calls));
            }

            // S5 Validate
            let mut valid_calls: Vec<ToolCall> = Vec::new();
            let mut immediate_results: Vec<ToolResult> = Vec::new();
            for call in &extraction.calls {
                match crate::json_repair::parse_or_repair(&call.arguments) {
                    Ok(_) => valid_calls.push(call.clone()),
                    Err(e) => {
                        immediate_results.push(ToolResult::error(
                            call.id.clone(),
                            serde_json::json!({ "error": format!("malformed arguments: {e}") }).to_string(),
                        ));
                    }
                }
            }

            if valid_calls.is_empty() {
                // All calls failed validation: don't orphan an
                // assistant-with-tool_calls message, fall back to plain text.
                session.append(Message::assistant(extraction.cleaned_content.clone()))?;
                session.save()?;
                continue;
            }

            all_tool_calls.extend(valid_calls.iter().cloned());

            // S6 Execute
            let pending_assistant =
                Message::assistant_with_tool_calls(extraction.cleaned_content.clone(), extraction.calls.clone());

            let batch: Vec<(String, Concurrency, bool)> = valid_calls
                .iter()
                .map(|c| match self.registry.get(&c.name) {
                    Some(tool) => (c.name.clone(), tool.concurrency(), tool.interactive()),
                    None => (c.name.clone(), Concurrency::Serial, false),
                })
                .collect();
            let waves = crate::tools::schedule_batch(&batch);

            let mut first_result_committed = !immediate_results.is_empty();
            if first_result_committed {
                // Error results for unrepairable calls commit immediately
                // alongside the assistant message so it's never held
                // pending on only-bad calls.
                let mut group = vec![pending_assistant.clone()];
                group.extend(immediate_results.drain(..).map(|r| Message::tool_result(r.tool_call_id, r.content)));
                session.append_atomic(group)?;
            }

            'waves: for wave in waves {
                if self.interrupt.pending() {
                    break 'waves;
                }

                let wave_calls: Vec<ToolCall> = wave.iter().map(|&i| valid_calls[i].clone()).collect();
                let results = executor::execute_wave(&self.registry, &wave_calls).await;

                for result in results {
                    let msg = Message::tool_result(result.tool_call_id.clone(), result.content.clone());
                    if !first_result_committed {
                        session.append_atomic(vec![pending_assistant.clone(), msg])?;
                        first_result_committed = true;
                    } else {
                        session.append(msg)?;
                    }
                }

                if self.interrupt.pending() {
                    break 'waves;
                }
            }

            // If every wave was aborted before any tool ran (interrupt hit
            // immediately), `pending_assistant` was never committed — there's
            // nothing to orphan.
            session.save()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderResponse;
    use crate::tools::file::ReadFileTool;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Deterministic scripted provider for orchestrator unit tests: pops
    /// one prepared response per call, in order. Optionally simulates an
    /// ESC keypress arriving mid-stream on a chosen call by tripping a
    /// shared [`InterruptController`] before returning that call's
    /// response — the same thing `on_chunk`'s poll would do for a real
    /// streaming provider, without needing a fake chunk stream.
    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
        call_count: std::sync::atomic::AtomicUsize,
        interrupt_on_call: Option<usize>,
        interrupt: Mutex<Option<InterruptController>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                call_count: std::sync::atomic::AtomicUsize::new(0),
                interrupt_on_call: None,
                interrupt: Mutex::new(None),
            }
        }

        /// Trip `ctl` (as if ESC arrived mid-stream) just before returning
        /// the response for the `n`th call (1-based).
        fn new_with_interrupt(responses: Vec<ProviderResponse>, n: usize) -> Self {
            Self {
                responses: Mutex::new(responses),
                call_count: std::sync::atomic::AtomicUsize::new(0),
                interrupt_on_call: Some(n),
                interrupt: Mutex::new(None),
            }
        }

        /// Wired in after the orchestrator exists, since the controller a
        /// real provider would observe is the one owned by the
        /// orchestrator it's streaming for.
        fn set_interrupt_controller(&self, ctl: InterruptController) {
            *self.interrupt.lock().unwrap() = Some(ctl);
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn send_streaming(
            &self,
            _messages: &[Message],
            _tools: &[crate::tools::ToolDescriptor],
            _sink: StreamSink<'_>,
        ) -> ProviderResponse {
            let call_number = self.call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if self.interrupt_on_call == Some(call_number) {
                if let Some(ctl) = self.interrupt.lock().unwrap().as_ref() {
                    ctl.trigger();
                }
            }

            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                ProviderResponse::ok("")
            } else {
                responses.remove(0)
            }
        }
    }

    fn test_orchestrator(responses: Vec<ProviderResponse>, registry: ToolRegistry) -> Orchestrator {
        Orchestrator::new(
            CoreConfig::default(),
            registry,
            Arc::new(ScriptedProvider::new(responses)),
            Arc::new(crate::ui::NullUi),
        )
    }

    #[tokio::test]
    async fn plain_answer_completes_in_one_iteration() {
        let orch = test_orchestrator(vec![ProviderResponse::ok("4")], ToolRegistry::new());
        let mut session = Session::new();
        let result = orch.process("What is 2+2?", &mut session).await.unwrap();
        assert!(result.success);
        assert_eq!(result.content, "4");
        assert_eq!(result.iterations, 1);
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn single_tool_then_answer_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("FILE_A"), "hello").unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadFileTool::new(dir.path().to_path_buf())));

        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: r#"{"path":"FILE_A"}"#.into(),
        };
        let responses = vec![
            ProviderResponse::with_tool_calls("Let me check.", vec![call]),
            ProviderResponse::ok("File contains: hello"),
        ];
        let orch = test_orchestrator(responses, registry);
        let mut session = Session::new();
        let result = orch.process("Read FILE_A", &mut session).await.unwrap();

        assert!(result.success);
        assert_eq!(result.content, "File contains: hello");
        assert_eq!(result.iterations, 2);

        let msgs = session.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[1].tool_calls.len(), 1);
        assert_eq!(msgs[2].role, Role::Tool);
        assert_eq!(msgs[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msgs[3].role, Role::Assistant);
        assert!(session.scan_integrity().is_clean());
    }

    #[tokio::test]
    async fn malformed_tool_call_args_get_error_result_not_orphan() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ReadFileTool::new(std::env::temp_dir())));

        let bad_call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: r#"{"path": "unterminated}"#.into(),
        };
        let responses = vec![
            ProviderResponse::with_tool_calls("", vec![bad_call]),
            ProviderResponse::ok("done"),
        ];
        let orch = test_orchestrator(responses, registry);
        let mut session = Session::new();
        let result = orch.process("go", &mut session).await.unwrap();
        assert!(result.success);
        assert!(session.scan_integrity().is_clean());
    }

    #[tokio::test]
    async fn iteration_bound_is_enforced() {
        let mut config = CoreConfig::default();
        config.max_iterations = 2;
        let responses = vec![
            ProviderResponse::with_tool_calls(
                "",
                vec![ToolCall {
                    id: "c1".into(),
                    name: "does_not_exist".into(),
                    arguments: "{}".into(),
                }],
            ),
            ProviderResponse::with_tool_calls(
                "",
                vec![ToolCall {
                    id: "c2".into(),
                    name: "does_not_exist".into(),
                    arguments: "{}".into(),
                }],
            ),
            ProviderResponse::ok("should never get here"),
        ];
        let orch = Orchestrator::new(
            config,
            ToolRegistry::new(),
            Arc::new(ScriptedProvider::new(responses)),
            Arc::new(crate::ui::NullUi),
        );
        let mut session = Session::new();
        let result = orch.process("loop forever", &mut session).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("iteration bound"));
    }

    #[tokio::test]
    async fn interrupt_prevents_pending_tool_calls_from_being_orphaned() {
        // Iteration 1's response carries a tool call, but the ESC is
        // simulated as arriving mid-stream for that very call (matching
        // spec §8 scenario 5: "no tool_calls from iter 2 were executed").
        let call = ToolCall {
            id: "c1".into(),
            name: "ask_user".into(),
            arguments: "{}".into(),
        };
        let responses = vec![
            ProviderResponse::with_tool_calls("", vec![call]),
            ProviderResponse::ok("stopped"),
        ];
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(crate::tools::collaborate::AskUserTool::new()));

        let provider = Arc::new(ScriptedProvider::new_with_interrupt(responses, 1));
        let orch = Orchestrator::new(CoreConfig::default(), registry, provider.clone(), Arc::new(crate::ui::NullUi));
        provider.set_interrupt_controller(orch.interrupt_controller());

        let mut session = Session::new();
        let result = orch.process("start a task", &mut session).await.unwrap();

        assert!(result.success);
        assert_eq!(result.content, "stopped");
        // The tool call from the interrupted iteration was never executed:
        // no `ask_user` tool_calls made it into the returned tally, and no
        // tool message for `c1` exists anywhere in the stored history.
        assert!(result.tool_calls_made.iter().all(|c| c.id != "c1"));
        assert!(session.messages().iter().all(|m| m.tool_call_id.as_deref() != Some("c1")));
        assert!(session.scan_integrity().is_clean());
        assert!(session.messages().iter().any(|m| m.role == Role::User && m.content.contains("interrupted")));
    }

    #[tokio::test]
    async fn server_error_retries_then_succeeds() {
        let responses = vec![
            ProviderResponse::err("503", ProviderErrorType::ServerError, true),
            ProviderResponse::ok("recovered"),
        ];
        let orch = test_orchestrator(responses, ToolRegistry::new());
        let mut session = Session::new();
        let result = orch.process("go", &mut session).await.unwrap();
        assert!(result.success);
        assert_eq!(result.content, "recovered");
    }

    #[tokio::test]
    async fn consecutive_identical_errors_trip_circuit_breaker() {
        let responses: Vec<ProviderResponse> = (0..4)
            .map(|_| ProviderResponse::err("503 stuck", ProviderErrorType::ServerError, true))
            .collect();
        let orch = test_orchestrator(responses, ToolRegistry::new());
        let mut session = Session::new();
        let result = orch.process("go", &mut session).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("repeated identical error"));
    }
}
