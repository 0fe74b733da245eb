//! Model interaction layer: provider trait, SSE streaming, retry, trace IDs.
//!
//! - [`provider`]: the [`ChatProvider`] seam the turn loop streams through.
//! - [`streaming`]: SSE decoding and the HTTP implementation on
//!   [`OpenRouterClient`](crate::OpenRouterClient), plus tool-call assembly.
//! - [`retry`]: backoff for transient transport failures.
//! - [`tracing`]: `trace_id` / `span_id` generation.

pub mod provider;
pub mod retry;
pub mod streaming;
pub mod tracing;

pub use provider::{ChatProvider, ProviderError, ProviderRequest};
pub use retry::RetryConfig;
pub use streaming::{StreamEvent, assemble_tool_calls, extract_usage};
pub use self::tracing::{generate_span_id, generate_trace_id};
