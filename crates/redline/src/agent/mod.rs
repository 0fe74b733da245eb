//! Agent runtime: the [`Session`] turn controller and its supporting modules.
//!
//! - [`session::Session`]: the caller surface. Start here.
//! - [`config::SessionConfig`]: model, credential, round cap, limits.
//! - [`events`]: [`TurnState`], [`TurnEvent`] and the [`EventHandler`]
//!   observers ([`LoggingHandler`], [`CompositeEventHandler`],
//!   [`FnEventHandler`]).
//! - [`turn`]: one turn's stream-then-run-tools round loop.

pub mod config;
pub mod events;
pub mod session;
pub mod turn;

pub use config::{DEFAULT_MAX_ROUNDS, SessionConfig};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, TurnEvent,
    TurnState,
};
pub use session::{ChatEntry, SendError, Session, SessionHandle, TurnSummary};
pub use turn::{AssistantDraft, Turn, TurnOutcome};
