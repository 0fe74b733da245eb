//! The model backend seam.
//!
//! A [`ChatProvider`] streams one model response for a conversation. The
//! turn loop only sees [`StreamEvent`]s, so tests can script a provider
//! and the HTTP client is just one implementation.

use super::streaming::StreamEvent;
use crate::{Message, ToolDef};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Everything a provider needs for one streamed response.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// Sent as a leading system message when non-empty.
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub credential: &'a str,
    pub model: &'a str,
    pub tools: &'a [ToolDef],
    /// 0 leaves the provider default.
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Failure of a streamed request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The cancellation token fired before the stream finished.
    #[error("request canceled")]
    Canceled,
    #[error("{0}")]
    Transport(String),
}

/// Streams chat completions.
pub trait ChatProvider: Send + Sync {
    /// Stream one response, calling `on_event` for each event as it arrives.
    ///
    /// Returns every event received. Implementations must stop promptly and
    /// return [`ProviderError::Canceled`] once `cancel` fires.
    fn stream<'a>(
        &'a self,
        request: ProviderRequest<'a>,
        cancel: &'a CancellationToken,
        on_event: &'a mut (dyn FnMut(&StreamEvent) + Send),
    ) -> BoxFuture<'a, Result<Vec<StreamEvent>, ProviderError>>;
}
