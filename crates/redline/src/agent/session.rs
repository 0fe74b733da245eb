//! The caller-facing turn controller.
//!
//! A [`Session`] owns the visible chat history, the model transcript, and
//! the turn-scoped state (change-set ledger, inspected paths, read cache).
//! One turn runs at a time: `send` and `retry` borrow the session mutably
//! for the whole turn, so a second submission cannot start until the first
//! returns. Other tasks observe or abort the turn through a
//! [`SessionHandle`]. The ledger outlives its turn so the diff can be
//! viewed after completion; it is cleared when the next turn starts.
//!
//! Outcomes:
//! - **Completed**: the assistant entry carries the change count and the
//!   transcript is committed.
//! - **Canceled**: the assistant entry is kept only if it has visible text
//!   or completed tool calls; otherwise the user's entry is removed too and
//!   history is exactly as before `send`.
//! - **Failed**: the partial entry is kept with an inline error marker, the
//!   error is exposed via [`Session::last_error`], and [`Session::retry`]
//!   resubmits the prompt.

use super::config::SessionConfig;
use super::events::{EventHandler, NoopHandler, TurnState};
use super::turn::{Turn, TurnOutcome};
use crate::api::provider::ChatProvider;
use crate::changes::ChangeRecord;
use crate::diff::render_change_set;
use crate::tools::{
    FileStore, OpenFileRegistry, OpenFiles, ToolCoordinator, ToolExecutionResult, TurnContext,
};
use crate::{Message, MessageRole, UsageInfo};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reasons `send` or `retry` refuse to start a turn. No state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("no API credential configured (set OPENROUTER_KEY)")]
    MissingCredential,
    #[error("no failed turn to retry")]
    NothingToRetry,
}

/// One entry of the visible chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls completed while producing this entry.
    pub tool_results: Vec<ToolExecutionResult>,
    /// Set on entries from failed turns.
    pub error: Option<String>,
    /// Net file changes made by the turn.
    pub change_count: usize,
    /// Whether a diff is available for this entry's turn.
    pub has_diff: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_results: Vec::new(),
            error: None,
            change_count: 0,
            has_diff: false,
            created_at: Utc::now(),
        }
    }

    fn assistant(outcome: TurnOutcome, change_count: usize) -> Self {
        let content = match &outcome.error {
            Some(error) if outcome.draft.content.is_empty() => format!("[Error: {error}]"),
            Some(error) => format!("{}\n\n[Error: {error}]", outcome.draft.content),
            None => outcome.draft.content,
        };
        Self {
            role: MessageRole::Assistant,
            content,
            tool_results: outcome.draft.tool_results,
            error: outcome.error,
            change_count,
            has_diff: change_count > 0,
            created_at: Utc::now(),
        }
    }
}

/// Result of a turn started by `send` or `retry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    pub trace_id: String,
    /// `Completed`, `Failed` or `Canceled`.
    pub state: TurnState,
    pub change_count: usize,
    pub rounds_used: u32,
    pub round_limit_reached: bool,
    pub usage: UsageInfo,
    pub error: Option<String>,
}

/// Cloneable handle for aborting the in-flight turn from another task or
/// from an event handler.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    streaming: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Cancel the in-flight turn. Returns `false` if no turn is running.
    pub fn abort(&self) -> bool {
        let guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(token) => {
                info!("Abort requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a turn is in flight.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn begin(&self, token: CancellationToken) -> ActiveTurn {
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
        self.streaming.store(true, Ordering::SeqCst);
        ActiveTurn(self.clone())
    }
}

/// Marks the handle idle when dropped, even if the `send` future is.
struct ActiveTurn(SessionHandle);

impl Drop for ActiveTurn {
    fn drop(&mut self) {
        *self.0.cancel.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.0.streaming.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct FailedTurn {
    prompt: String,
    /// Index of the failed turn's user entry.
    entry_index: usize,
}

/// A conversation with the agent over one project.
pub struct Session {
    provider: Arc<dyn ChatProvider>,
    store: Arc<dyn FileStore>,
    open_files: Arc<dyn OpenFileRegistry>,
    handler: Arc<dyn EventHandler>,
    project: PathBuf,
    config: SessionConfig,
    entries: Vec<ChatEntry>,
    /// Committed model-facing conversation (no system prompt).
    transcript: Vec<Message>,
    turn: TurnContext,
    state: TurnState,
    last_error: Option<String>,
    failed: Option<FailedTurn>,
    handle: SessionHandle,
}

impl Session {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: Arc<dyn FileStore>,
        project: impl Into<PathBuf>,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            store,
            open_files: Arc::new(OpenFiles::new()),
            handler: Arc::new(NoopHandler),
            project: project.into(),
            config,
            entries: Vec::new(),
            transcript: Vec::new(),
            turn: TurnContext::new(),
            state: TurnState::Idle,
            last_error: None,
            failed: None,
            handle: SessionHandle::default(),
        }
    }

    /// Use an editor-side registry of open files.
    pub fn with_open_files(mut self, open_files: Arc<dyn OpenFileRegistry>) -> Self {
        self.open_files = open_files;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    // ── Turns ──────────────────────────────────────────────────────

    /// Submit a prompt and run one turn to completion, failure, or
    /// cancellation.
    ///
    /// Validation errors return `Err` without touching any state. Provider
    /// failures are not `Err`: they end the turn as `Failed` and are
    /// reported through [`last_error`](Self::last_error).
    pub async fn send(&mut self, text: &str) -> Result<TurnSummary, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyPrompt);
        }
        let credential = self.credential()?;
        Ok(self.run_turn(text.to_string(), credential).await)
    }

    /// Resubmit the prompt of the last failed turn, replacing its entries.
    pub async fn retry(&mut self) -> Result<TurnSummary, SendError> {
        let Some(failed) = self.failed.clone() else {
            return Err(SendError::NothingToRetry);
        };
        let credential = self.credential()?;
        info!("Retrying failed turn");
        self.entries.truncate(failed.entry_index);
        Ok(self.run_turn(failed.prompt, credential).await)
    }

    /// Handle for aborting the in-flight turn.
    pub fn abort_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Reset to an empty conversation: history, transcript, turn state and
    /// last error.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.transcript.clear();
        self.turn.discard();
        self.last_error = None;
        self.failed = None;
        self.state = TurnState::Idle;
        debug!("Session cleared");
    }

    /// Switch to another project. Everything tied to the old one is dropped.
    pub fn open_project(&mut self, root: impl Into<PathBuf>) {
        self.project = root.into();
        self.clear();
        info!("Opened project {}", self.project.display());
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Net file changes from the last turn.
    pub fn change_set_count(&self) -> usize {
        self.turn.ledger.len()
    }

    /// Ordered snapshot of the last turn's change set.
    pub fn change_set(&self) -> Vec<ChangeRecord> {
        self.turn.ledger.snapshot()
    }

    /// Unified diff of the last turn's changes, or
    /// [`NO_CHANGES_MESSAGE`](crate::diff::NO_CHANGES_MESSAGE).
    pub fn diff_text(&self) -> String {
        render_change_set(&self.turn.ledger.snapshot(), self.config.context_lines)
    }

    /// Visible chat history.
    pub fn messages(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Error of the last failed turn, cleared when the next turn starts.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// State of the last turn, or `Idle`.
    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.handle.is_streaming()
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Internals ──────────────────────────────────────────────────

    fn credential(&self) -> Result<String, SendError> {
        self.config
            .credential
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or(SendError::MissingCredential)
    }

    async fn run_turn(&mut self, prompt: String, credential: String) -> TurnSummary {
        self.turn.begin(self.open_files.open_paths());
        self.last_error = None;
        self.failed = None;

        let entry_index = self.entries.len();
        self.entries.push(ChatEntry::user(prompt.as_str()));
        let mut transcript = self.transcript.clone();
        transcript.push(Message::user(prompt.as_str()));

        let cancel = CancellationToken::new();
        let active = self.handle.begin(cancel.clone());
        self.state = TurnState::Streaming;

        let coordinator = ToolCoordinator::new(
            self.store.clone(),
            self.open_files.clone(),
            self.project.clone(),
        )
        .with_read_truncate_chars(self.config.read_truncate_chars)
        .with_arg_validation(self.config.validate_tool_args);

        let outcome = Turn::new(
            self.provider.as_ref(),
            &coordinator,
            &self.config,
            &credential,
            self.handler.as_ref(),
            &cancel,
        )
        .run(&transcript, &mut self.turn)
        .await;
        drop(active);

        let change_count = self.turn.ledger.len();
        let summary = TurnSummary {
            trace_id: outcome.trace_id.clone(),
            state: outcome.state,
            change_count,
            rounds_used: outcome.rounds_used,
            round_limit_reached: outcome.round_limit_reached,
            usage: outcome.usage.clone(),
            error: outcome.error.clone(),
        };
        self.state = outcome.state;

        match outcome.state {
            TurnState::Failed => {
                self.last_error = outcome.error.clone();
                self.failed = Some(FailedTurn {
                    prompt,
                    entry_index,
                });
                self.entries.push(ChatEntry::assistant(outcome, change_count));
            }
            TurnState::Canceled if !outcome.draft.has_output() => {
                debug!("Canceled turn produced no output; pruning it");
                self.entries.truncate(entry_index);
            }
            _ => {
                transcript.extend(outcome.messages.iter().cloned());
                self.transcript = transcript;
                self.entries.push(ChatEntry::assistant(outcome, change_count));
            }
        }

        summary
    }
}
