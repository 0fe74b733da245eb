//! Convenience re-exports for common `redline` types.
//!
//! ```ignore
//! use redline::prelude::*;
//! ```
//!
//! Covers driving a session and observing it. Diff internals, SSE decoding
//! and the coordinator's argument types live in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, OpenRouterClient, ToolCall, ToolDef};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    ChatEntry, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    SendError, Session, SessionConfig, SessionHandle, TurnEvent, TurnState, TurnSummary,
};

// ── Provider ────────────────────────────────────────────────────────
pub use crate::api::{ChatProvider, ProviderError, ProviderRequest, RetryConfig, StreamEvent};

// ── Changes and diffs ───────────────────────────────────────────────
pub use crate::changes::{ChangeKind, ChangeRecord, ChangeSetLedger};
pub use crate::diff::{NO_CHANGES_MESSAGE, render_change_set, render_file_diff};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    FileStore, LocalFileStore, MemoryFileStore, OpenFileRegistry, OpenFiles, ToolCoordinator,
    ToolExecutionResult, TurnContext,
};
