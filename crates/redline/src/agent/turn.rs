//! One turn's round loop.
//!
//! Each round streams a model response, then runs the requested tool calls
//! in order and feeds their results back. The loop ends when the model
//! answers without tool calls, the round cap is hit, the provider fails, or
//! the cancellation token fires.
//!
//! Cancellation is observed at network-read granularity inside the provider
//! and before each tool call. A tool call that already started runs to
//! completion so no file is left half-written.

use super::config::SessionConfig;
use super::events::{EventHandler, TurnEvent, TurnState};
use crate::api::provider::{ChatProvider, ProviderError, ProviderRequest};
use crate::api::streaming::{StreamEvent, assemble_tool_calls, extract_usage, stream_error};
use crate::api::tracing::{generate_span_id, generate_trace_id};
use crate::tools::{ToolCoordinator, ToolExecutionResult, TurnContext};
use crate::{Message, ToolCall, ToolDef, UsageInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tool-result text for calls skipped because the turn was canceled.
pub const CANCELED_TOOL_OUTPUT: &str = "Error: canceled before execution";

/// The visible assistant output accumulated over a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantDraft {
    /// Concatenation of every text delta, across all rounds.
    pub content: String,
    /// Results of the tool calls that ran.
    pub tool_results: Vec<ToolExecutionResult>,
}

impl AssistantDraft {
    /// Whether the user has seen anything from this turn.
    pub fn has_output(&self) -> bool {
        !self.content.trim().is_empty() || !self.tool_results.is_empty()
    }
}

/// How a turn ended.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub trace_id: String,
    /// `Completed`, `Failed` or `Canceled`.
    pub state: TurnState,
    pub draft: AssistantDraft,
    /// Messages the turn appended after the caller's history: assistant
    /// messages and tool results, in order.
    pub messages: Vec<Message>,
    pub rounds_used: u32,
    pub round_limit_reached: bool,
    /// Token usage summed over every round that reported it.
    pub usage: UsageInfo,
    /// Provider or transport error for `Failed` turns.
    pub error: Option<String>,
}

/// Borrowed collaborators for one turn.
pub struct Turn<'a> {
    provider: &'a dyn ChatProvider,
    coordinator: &'a ToolCoordinator,
    config: &'a SessionConfig,
    credential: &'a str,
    handler: &'a dyn EventHandler,
    cancel: &'a CancellationToken,
}

/// Mutable state threaded through the rounds.
struct Progress {
    trace_id: String,
    draft: AssistantDraft,
    messages: Vec<Message>,
    rounds_used: u32,
    round_limit_reached: bool,
    usage: UsageInfo,
}

impl<'a> Turn<'a> {
    pub fn new(
        provider: &'a dyn ChatProvider,
        coordinator: &'a ToolCoordinator,
        config: &'a SessionConfig,
        credential: &'a str,
        handler: &'a dyn EventHandler,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            provider,
            coordinator,
            config,
            credential,
            handler,
            cancel,
        }
    }

    /// Run the turn over `history`, which must end with the user's prompt.
    ///
    /// `ctx` must already be reset for this turn; the coordinator records
    /// into its ledger.
    pub async fn run(&self, history: &[Message], ctx: &mut TurnContext) -> TurnOutcome {
        let mut progress = Progress {
            trace_id: generate_trace_id(),
            draft: AssistantDraft::default(),
            messages: Vec::new(),
            rounds_used: 0,
            round_limit_reached: false,
            usage: UsageInfo::default(),
        };
        let max_rounds = self.config.max_rounds.max(1);
        let tools = ToolCoordinator::definitions();

        info!(
            "Turn {} started (model={}, max_rounds={max_rounds})",
            progress.trace_id, self.config.model
        );

        for round in 1..=max_rounds {
            if self.cancel.is_cancelled() {
                return self.finish_canceled(progress);
            }
            progress.rounds_used = round;
            self.emit(&TurnEvent::Status(TurnState::Streaming));
            self.emit(&TurnEvent::RoundStart { round, max_rounds });
            debug!("Span {}", generate_span_id(&progress.trace_id, round));

            let mut transcript = history.to_vec();
            transcript.extend_from_slice(&progress.messages);

            let mut round_text = String::new();
            let streamed = self
                .stream_round(&transcript, &tools, &mut progress.draft, &mut round_text)
                .await;

            let events = match streamed {
                Ok(events) => events,
                Err(ProviderError::Canceled) => {
                    if !round_text.is_empty() {
                        progress.messages.push(Message::assistant_text(round_text));
                    }
                    return self.finish_canceled(progress);
                }
                Err(ProviderError::Transport(e)) => return self.finish_failed(progress, e),
            };

            if let Some(usage) = extract_usage(&events) {
                progress.usage.accumulate(&usage);
            }

            if let Some(error) = stream_error(&events) {
                let error = error.to_string();
                return self.finish_failed(progress, error);
            }

            let calls = assemble_tool_calls(&events);
            if calls.is_empty() {
                if !round_text.is_empty() {
                    progress.messages.push(Message::assistant_text(round_text));
                }
                return self.finish_completed(progress, ctx);
            }

            progress
                .messages
                .push(Message::assistant_tool_calls(Some(round_text), calls.clone()));
            self.emit(&TurnEvent::Status(TurnState::ToolCallPending));
            self.emit(&TurnEvent::ToolCallsReceived {
                round,
                count: calls.len(),
            });

            if !self.run_tool_calls(&calls, ctx, &mut progress).await {
                return self.finish_canceled(progress);
            }

            if round == max_rounds {
                progress.round_limit_reached = true;
                warn!(
                    "Turn {} hit the round cap ({max_rounds}) with tool calls outstanding",
                    progress.trace_id
                );
                self.emit(&TurnEvent::RoundLimitReached { max_rounds });
            }
        }

        self.finish_completed(progress, ctx)
    }

    /// Stream one model response, retrying transient failures that happen
    /// before any event arrives.
    async fn stream_round(
        &self,
        transcript: &[Message],
        tools: &[ToolDef],
        draft: &mut AssistantDraft,
        round_text: &mut String,
    ) -> Result<Vec<StreamEvent>, ProviderError> {
        let request = ProviderRequest {
            system_prompt: &self.config.system_prompt,
            messages: transcript,
            credential: self.credential,
            model: &self.config.model,
            tools,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut attempt = 0;
        loop {
            let mut emitted = 0usize;
            let mut on_event = |event: &StreamEvent| {
                emitted += 1;
                if let StreamEvent::TextDelta(text) = event {
                    draft.content.push_str(text);
                    round_text.push_str(text);
                    self.emit(&TurnEvent::TextDelta(text));
                }
            };

            let error = match self.provider.stream(request, self.cancel, &mut on_event).await {
                Ok(events) => return Ok(events),
                Err(e) => e,
            };

            if !self.config.retry.should_retry(&error, attempt, emitted) {
                return Err(error);
            }

            let delay = self.config.retry.delay_for_attempt(attempt);
            attempt += 1;
            let message = error.to_string();
            warn!(
                "Transient stream error (attempt {attempt}/{}): {message}. Retrying in {delay:?}...",
                self.config.retry.max_retries
            );
            self.emit(&TurnEvent::Retrying {
                attempt,
                max_retries: self.config.retry.max_retries,
                error: &message,
            });
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ProviderError::Canceled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Execute `calls` in order. Returns `false` if canceled before all ran;
    /// skipped calls still get a tool-result message so the transcript
    /// stays well-formed.
    async fn run_tool_calls(
        &self,
        calls: &[ToolCall],
        ctx: &mut TurnContext,
        progress: &mut Progress,
    ) -> bool {
        for (i, call) in calls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                for skipped in calls.iter().skip(i) {
                    progress
                        .messages
                        .push(Message::tool_result(&skipped.id, CANCELED_TOOL_OUTPUT));
                }
                return false;
            }

            self.emit(&TurnEvent::ToolExecuting {
                name: &call.function.name,
                arguments: &call.function.arguments,
            });
            let result = self.coordinator.execute(call, ctx).await;
            progress
                .messages
                .push(Message::tool_result(&call.id, result.model_content()));
            self.emit(&TurnEvent::ToolResult {
                name: &result.name,
                call_id: &result.tool_call_id,
                ok: result.ok,
                output: &result.output,
            });
            progress.draft.tool_results.push(result);
        }
        true
    }

    fn finish_completed(&self, progress: Progress, ctx: &TurnContext) -> TurnOutcome {
        self.emit(&TurnEvent::Status(TurnState::Finalizing));
        let change_count = ctx.ledger.len();
        info!(
            "Turn {} completed after {} round(s), {change_count} file change(s), {} prompt / {} completion tokens",
            progress.trace_id,
            progress.rounds_used,
            progress.usage.prompt_tokens.unwrap_or(0),
            progress.usage.completion_tokens.unwrap_or(0)
        );
        self.emit(&TurnEvent::Finished { change_count });
        self.emit(&TurnEvent::Status(TurnState::Completed));
        outcome(progress, TurnState::Completed, None)
    }

    fn finish_canceled(&self, progress: Progress) -> TurnOutcome {
        info!("Turn {} canceled", progress.trace_id);
        self.emit(&TurnEvent::Canceled);
        self.emit(&TurnEvent::Status(TurnState::Canceled));
        outcome(progress, TurnState::Canceled, None)
    }

    fn finish_failed(&self, progress: Progress, error: String) -> TurnOutcome {
        warn!("Turn {} failed: {error}", progress.trace_id);
        self.emit(&TurnEvent::Failed { error: &error });
        self.emit(&TurnEvent::Status(TurnState::Failed));
        outcome(progress, TurnState::Failed, Some(error))
    }

    fn emit(&self, event: &TurnEvent<'_>) {
        self.handler.on_event(event);
    }
}

fn outcome(progress: Progress, state: TurnState, error: Option<String>) -> TurnOutcome {
    TurnOutcome {
        trace_id: progress.trace_id,
        state,
        draft: progress.draft,
        messages: progress.messages,
        rounds_used: progress.rounds_used,
        round_limit_reached: progress.round_limit_reached,
        usage: progress.usage,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{FnEventHandler, NoopHandler};
    use crate::tools::{MemoryFileStore, OpenFiles};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Round = Result<Vec<StreamEvent>, ProviderError>;

    /// Replays one scripted response per round and records each request.
    struct Scripted {
        rounds: Mutex<VecDeque<Round>>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl Scripted {
        fn new(rounds: Vec<Round>) -> Self {
            Self {
                rounds: Mutex::new(rounds.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatProvider for Scripted {
        fn stream<'a>(
            &'a self,
            request: ProviderRequest<'a>,
            _cancel: &'a CancellationToken,
            on_event: &'a mut (dyn FnMut(&StreamEvent) + Send),
        ) -> BoxFuture<'a, Result<Vec<StreamEvent>, ProviderError>> {
            async move {
                self.requests.lock().unwrap().push(request.messages.to_vec());
                let next = self.rounds.lock().unwrap().pop_front();
                let events = next.unwrap_or_else(|| Err(ProviderError::Transport("exhausted".into())))?;
                for event in &events {
                    on_event(event);
                }
                Ok(events)
            }
            .boxed()
        }
    }

    fn text(s: &str) -> StreamEvent {
        StreamEvent::TextDelta(s.into())
    }

    fn call(index: usize, id: &str, name: &str, args: &str) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments_delta: args.into(),
        }
    }

    struct Fixture {
        store: Arc<MemoryFileStore>,
        coordinator: ToolCoordinator,
        config: SessionConfig,
        cancel: CancellationToken,
        ctx: TurnContext,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryFileStore::new().with_file("a.txt", "one\n"));
            let coordinator =
                ToolCoordinator::new(store.clone(), Arc::new(OpenFiles::new()), "/project");
            Self {
                store,
                coordinator,
                config: SessionConfig::default(),
                cancel: CancellationToken::new(),
                ctx: TurnContext::new(),
            }
        }

        async fn run(&mut self, provider: &Scripted, handler: &dyn EventHandler) -> TurnOutcome {
            let turn = Turn::new(
                provider,
                &self.coordinator,
                &self.config,
                "key",
                handler,
                &self.cancel,
            );
            turn.run(&[Message::user("go")], &mut self.ctx).await
        }
    }

    #[tokio::test]
    async fn text_only_response_completes_in_one_round() {
        let mut fx = Fixture::new();
        let provider = Scripted::new(vec![Ok(vec![text("Hel"), text("lo"), StreamEvent::Done])]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.state, TurnState::Completed);
        assert_eq!(out.draft.content, "Hello");
        assert_eq!(out.rounds_used, 1);
        assert_eq!(out.messages, vec![Message::assistant_text("Hello")]);
    }

    #[tokio::test]
    async fn usage_is_summed_across_rounds() {
        let mut fx = Fixture::new();
        let usage = |prompt, completion| {
            StreamEvent::Usage(UsageInfo {
                prompt_tokens: Some(prompt),
                completion_tokens: Some(completion),
                total_tokens: Some(prompt + completion),
            })
        };
        let provider = Scripted::new(vec![
            Ok(vec![
                call(0, "c1", "read_file", r#"{"path":"a.txt"}"#),
                usage(120, 15),
                StreamEvent::Done,
            ]),
            Ok(vec![text("Done."), usage(180, 4), StreamEvent::Done]),
        ]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.rounds_used, 2);
        assert_eq!(out.usage.prompt_tokens, Some(300));
        assert_eq!(out.usage.completion_tokens, Some(19));
        assert_eq!(out.usage.total_tokens, Some(319));
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_next_round() {
        let mut fx = Fixture::new();
        let provider = Scripted::new(vec![
            Ok(vec![
                text("Reading. "),
                call(0, "c1", "read_file", r#"{"path":"a.txt"}"#),
                call(1, "c2", "write_file", r#"{"path":"a.txt","content":"two\n"}"#),
            ]),
            Ok(vec![text("Done.")]),
        ]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.state, TurnState::Completed);
        assert_eq!(out.draft.content, "Reading. Done.");
        assert_eq!(out.draft.tool_results.len(), 2);
        assert!(out.draft.tool_results.iter().all(|r| r.ok));
        assert_eq!(fx.store.get("a.txt").as_deref(), Some("two\n"));
        assert_eq!(fx.ctx.ledger.len(), 1);

        let requests = provider.requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(second[2].content.as_deref(), Some("one\n"));
    }

    #[tokio::test]
    async fn round_cap_stops_tool_loops() {
        let mut fx = Fixture::new();
        fx.config.max_rounds = 2;
        let looping = || Ok(vec![call(0, "c", "read_file", r#"{"path":"a.txt"}"#)]);
        let provider = Scripted::new(vec![looping(), looping(), looping()]);

        let limits = Arc::new(Mutex::new(0));
        let seen = limits.clone();
        let handler = FnEventHandler::new(move |e| {
            if matches!(e, TurnEvent::RoundLimitReached { .. }) {
                *seen.lock().unwrap() += 1;
            }
        });
        let out = fx.run(&provider, &handler).await;

        assert_eq!(out.state, TurnState::Completed);
        assert!(out.round_limit_reached);
        assert_eq!(out.rounds_used, 2);
        assert_eq!(*limits.lock().unwrap(), 1);
        assert_eq!(provider.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn in_stream_error_fails_the_turn() {
        let mut fx = Fixture::new();
        let provider = Scripted::new(vec![Ok(vec![
            text("partial"),
            StreamEvent::Error("overloaded".into()),
        ])]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.state, TurnState::Failed);
        assert_eq!(out.error.as_deref(), Some("overloaded"));
        assert_eq!(out.draft.content, "partial");
    }

    #[tokio::test]
    async fn transient_failure_is_retried_when_configured() {
        let mut fx = Fixture::new();
        fx.config.retry = crate::api::RetryConfig {
            initial_delay: std::time::Duration::from_millis(1),
            ..crate::api::RetryConfig::with_retries(1)
        };
        let provider = Scripted::new(vec![
            Err(ProviderError::Transport("OpenRouter API HTTP 503: busy".into())),
            Ok(vec![text("ok")]),
        ]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.state, TurnState::Completed);
        assert_eq!(out.draft.content, "ok");
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let mut fx = Fixture::new();
        fx.config.retry = crate::api::RetryConfig::with_retries(3);
        let provider = Scripted::new(vec![Err(ProviderError::Transport(
            "OpenRouter API HTTP 401: unauthorized".into(),
        ))]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.state, TurnState::Failed);
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_during_tool_calls_skips_the_rest() {
        let mut fx = Fixture::new();
        let provider = Scripted::new(vec![Ok(vec![
            call(0, "c1", "read_file", r#"{"path":"a.txt"}"#),
            call(1, "c2", "write_file", r#"{"path":"a.txt","content":"x"}"#),
        ])]);
        let cancel = fx.cancel.clone();
        let handler = FnEventHandler::new(move |e| {
            if matches!(e, TurnEvent::ToolResult { .. }) {
                cancel.cancel();
            }
        });
        let out = fx.run(&provider, &handler).await;

        assert_eq!(out.state, TurnState::Canceled);
        assert_eq!(out.draft.tool_results.len(), 1);
        assert!(out.draft.has_output());
        assert_eq!(fx.store.get("a.txt").as_deref(), Some("one\n"));
        let last = out.messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("c2"));
        assert_eq!(last.content.as_deref(), Some(CANCELED_TOOL_OUTPUT));
    }

    #[tokio::test]
    async fn canceled_before_first_round_has_no_output() {
        let mut fx = Fixture::new();
        fx.cancel.cancel();
        let provider = Scripted::new(vec![Ok(vec![text("never")])]);
        let out = fx.run(&provider, &NoopHandler).await;

        assert_eq!(out.state, TurnState::Canceled);
        assert!(!out.draft.has_output());
        assert!(out.messages.is_empty());
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_events_follow_the_state_machine() {
        let mut fx = Fixture::new();
        let provider = Scripted::new(vec![
            Ok(vec![call(0, "c1", "read_file", r#"{"path":"a.txt"}"#)]),
            Ok(vec![text("done")]),
        ]);
        let states = Arc::new(Mutex::new(Vec::new()));
        let seen = states.clone();
        let handler = FnEventHandler::new(move |e| {
            if let TurnEvent::Status(s) = e {
                seen.lock().unwrap().push(*s);
            }
        });
        fx.run(&provider, &handler).await;

        assert_eq!(
            *states.lock().unwrap(),
            vec![
                TurnState::Streaming,
                TurnState::ToolCallPending,
                TurnState::Streaming,
                TurnState::Finalizing,
                TurnState::Completed,
            ]
        );
    }
}
