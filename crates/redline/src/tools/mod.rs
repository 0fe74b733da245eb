//! File tools for the agent and the state they consult.
//!
//! - [`coordinator`]: [`ToolCoordinator`]: dispatch of `read_file`,
//!   `write_file` and `delete_file` with the read-before-write gate.
//! - [`context`]: [`TurnContext`], the turn-scoped state lent to the
//!   coordinator (ledger, inspected paths, read cache).
//! - [`read_tracker`]: [`InspectedSet`] and [`ReadCache`].
//! - [`store`]: [`FileStore`] collaborator with local and in-memory
//!   implementations.
//! - [`open_files`]: [`OpenFileRegistry`] for editor tabs.
//! - [`core`]: [`ToolExecutionResult`], typed arguments, truncation.
//! - [`spec`]: [`ToolSpec`](spec::ToolSpec) builder for tool descriptions.
//! - [`path`]: [`normalize_path`].

pub mod context;
pub mod coordinator;
pub mod core;
pub mod names;
pub mod open_files;
pub mod path;
pub mod read_tracker;
pub mod spec;
pub mod store;

pub use context::TurnContext;
pub use coordinator::ToolCoordinator;
pub use core::{DEFAULT_READ_TRUNCATE_CHARS, ToolExecutionResult, truncate_output};
pub use open_files::{OpenFileRegistry, OpenFiles};
pub use path::normalize_path;
pub use read_tracker::{InspectedSet, ReadCache};
pub use store::{FileStore, LocalFileStore, MemoryFileStore};
