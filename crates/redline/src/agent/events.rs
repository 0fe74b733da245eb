//! Turn states, events, and handlers.
//!
//! A turn reports everything it does through [`TurnEvent`]s. Callers
//! implement [`EventHandler`] to render output, log, or abort.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget turns |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use tracing::{debug, info, trace, warn};

// ── States ─────────────────────────────────────────────────────────

/// Turn lifecycle.
///
/// `Idle → Streaming → (ToolCallPending → Streaming)* → Finalizing →
/// Completed`, with `Failed` and `Canceled` reachable from any active
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming,
    ToolCallPending,
    Finalizing,
    Completed,
    Failed,
    Canceled,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::Streaming => "streaming",
            TurnState::ToolCallPending => "tool-call-pending",
            TurnState::Finalizing => "finalizing",
            TurnState::Completed => "completed",
            TurnState::Failed => "failed",
            TurnState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted while a turn runs, in order.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// The turn moved to a new state.
    Status(TurnState),
    /// A model round is starting (1-based).
    RoundStart { round: u32, max_rounds: u32 },
    /// Incremental assistant text.
    TextDelta(&'a str),
    /// The model requested tool calls this round.
    ToolCallsReceived { round: u32, count: usize },
    /// A tool call is about to run.
    ToolExecuting { name: &'a str, arguments: &'a str },
    /// A tool call finished.
    ToolResult {
        name: &'a str,
        call_id: &'a str,
        ok: bool,
        output: &'a str,
    },
    /// Establishing the stream failed transiently; retrying after a delay.
    Retrying {
        attempt: u32,
        max_retries: u32,
        error: &'a str,
    },
    /// The round cap ended the turn while the model still wanted tools.
    RoundLimitReached { max_rounds: u32 },
    /// The turn completed with this many net file changes.
    Finished { change_count: usize },
    Canceled,
    Failed { error: &'a str },
}

/// Observer for turn events.
///
/// Handlers run inline on the turn's task, so they should return quickly.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &TurnEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let TurnEvent::TextDelta(text) = event {
///         print!("{text}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&TurnEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &TurnEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(echo, printer);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        match event {
            TurnEvent::Status(state) => debug!("Turn state: {state}"),
            TurnEvent::RoundStart { round, max_rounds } => {
                info!("[round {round}/{max_rounds}]");
            }
            TurnEvent::TextDelta(text) => trace!("Text delta: {} chars", text.len()),
            TurnEvent::ToolCallsReceived { round, count } => {
                debug!("{count} tool call(s) in round {round}");
            }
            TurnEvent::ToolExecuting { name, arguments } => {
                let preview: String = arguments.chars().take(120).collect();
                debug!("Executing tool: {name} {preview}");
            }
            TurnEvent::ToolResult {
                name, ok, output, ..
            } => {
                if *ok {
                    debug!("Tool {name} ok: {} chars", output.len());
                } else {
                    info!("Tool {name} refused: {output}");
                }
            }
            TurnEvent::Retrying {
                attempt,
                max_retries,
                error,
            } => {
                warn!("Retrying stream (attempt {attempt}/{max_retries}): {error}");
            }
            TurnEvent::RoundLimitReached { max_rounds } => {
                warn!("Round limit reached ({max_rounds} rounds)");
            }
            TurnEvent::Finished { change_count } => {
                info!("Turn finished with {change_count} file change(s)");
            }
            TurnEvent::Canceled => info!("Turn canceled"),
            TurnEvent::Failed { error } => warn!("Turn failed: {error}"),
        }
    }
}
