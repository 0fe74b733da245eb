//! Server-Sent Events (SSE) streaming for OpenAI-compatible chat APIs.
//!
//! [`OpenRouterClient`] implements [`ChatProvider`] by POSTing a streaming
//! request and decoding `data:` lines into [`StreamEvent`]s as chunks
//! arrive. Cancellation is checked around every network await.

use super::provider::{ChatProvider, ProviderError, ProviderRequest};
use crate::{ChatRequest, Message, OpenRouterClient, ToolCall, UsageInfo};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A single event from an SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// A tool call chunk (accumulated until complete).
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    /// Token usage information (sent in the final chunk).
    Usage(UsageInfo),
    /// The stream is complete.
    Done,
    /// The server reported an error inside the stream.
    Error(String),
}

/// Raw SSE data chunk.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
    error: Option<StreamError>,
}

#[derive(Deserialize, Debug)]
struct StreamError {
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize, Debug)]
struct StreamToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

// ── Line decoder ───────────────────────────────────────────────────

/// Incremental SSE decoder.
///
/// Buffers raw bytes so a multi-byte character split across network chunks
/// is decoded once whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `data: [DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a network chunk, returning the events from every complete line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while !self.done
            && let Some(pos) = self.buffer.iter().position(|&b| b == b'\n')
        {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&String::from_utf8_lossy(&line), &mut events);
        }
        events
    }

    /// Flush an unterminated final line and guarantee a trailing `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.done {
            let rest = std::mem::take(&mut self.buffer);
            self.decode_line(&String::from_utf8_lossy(&rest), &mut events);
        }
        if !self.done {
            self.done = true;
            events.push(StreamEvent::Done);
        }
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        if line == "data: [DONE]" {
            self.done = true;
            events.push(StreamEvent::Done);
            return;
        }
        if let Some(data) = line.strip_prefix("data: ") {
            parse_sse_data(data, events);
        }
    }
}

/// Parse a single SSE `data:` payload into stream events.
fn parse_sse_data(data: &str, events: &mut Vec<StreamEvent>) {
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e}; data: {data}");
            return;
        }
    };

    if let Some(error) = chunk.error {
        events.push(StreamEvent::Error(
            error
                .message
                .unwrap_or_else(|| "provider reported an error".into()),
        ));
    }

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage));
    }

    for choice in chunk.choices.unwrap_or_default() {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content
                && !content.is_empty()
            {
                events.push(StreamEvent::TextDelta(content));
            }
            for tc in delta.tool_calls.unwrap_or_default() {
                let func = tc.function.unwrap_or(StreamFunctionDelta {
                    name: None,
                    arguments: None,
                });
                events.push(StreamEvent::ToolCallDelta {
                    index: tc.index.unwrap_or(0),
                    id: tc.id,
                    name: func.name,
                    arguments_delta: func.arguments.unwrap_or_default(),
                });
            }
        }
        if choice.finish_reason.is_some() {
            trace!("Stream finish_reason: {:?}", choice.finish_reason);
        }
    }
}

// ── HTTP provider ──────────────────────────────────────────────────

impl OpenRouterClient {
    async fn stream_inner(
        &self,
        request: ProviderRequest<'_>,
        cancel: &CancellationToken,
        on_event: &mut (dyn FnMut(&StreamEvent) + Send),
    ) -> Result<Vec<StreamEvent>, ProviderError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(Message::system(request.system_prompt));
        }
        messages.extend_from_slice(request.messages);

        let body = ChatRequest {
            model: Some(request.model.to_string()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: (!request.tools.is_empty()).then(|| request.tools.to_vec()),
            stream: true,
        };

        debug!(model = request.model, "Sending streaming chat request");

        let send = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", request.credential))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send();

        let mut resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Canceled),
            resp = send => resp.map_err(|e| ProviderError::Transport(format!("request failed: {e}")))?,
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!(
                "OpenRouter API HTTP {status}: {text}"
            )));
        }

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();

        while !decoder.is_done() {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Canceled),
                chunk = resp.chunk() => chunk.map_err(|e| {
                    ProviderError::Transport(format!("failed to read streaming chunk: {e}"))
                })?,
            };
            let Some(chunk) = chunk else { break };
            for event in decoder.push(&chunk) {
                on_event(&event);
                events.push(event);
            }
        }

        for event in decoder.finish() {
            on_event(&event);
            events.push(event);
        }

        debug!("Stream completed with {} events", events.len());
        Ok(events)
    }
}

impl ChatProvider for OpenRouterClient {
    fn stream<'a>(
        &'a self,
        request: ProviderRequest<'a>,
        cancel: &'a CancellationToken,
        on_event: &'a mut (dyn FnMut(&StreamEvent) + Send),
    ) -> BoxFuture<'a, Result<Vec<StreamEvent>, ProviderError>> {
        self.stream_inner(request, cancel, on_event).boxed()
    }
}

// ── Event helpers ──────────────────────────────────────────────────

/// First in-stream error, if any.
pub fn stream_error(events: &[StreamEvent]) -> Option<&str> {
    events.iter().find_map(|e| match e {
        StreamEvent::Error(msg) => Some(msg.as_str()),
        _ => None,
    })
}

/// Extract usage info from stream events (if present).
pub fn extract_usage(events: &[StreamEvent]) -> Option<UsageInfo> {
    events.iter().rev().find_map(|e| match e {
        StreamEvent::Usage(usage) => Some(usage.clone()),
        _ => None,
    })
}

/// Assemble complete tool calls from `ToolCallDelta` events.
///
/// The first delta for an index carries the id and name; later deltas carry
/// argument fragments. Calls missing an id or name are dropped. Output is
/// ordered by stream index.
pub fn assemble_tool_calls(events: &[StreamEvent]) -> Vec<ToolCall> {
    let mut calls: BTreeMap<usize, (Option<String>, Option<String>, String)> = BTreeMap::new();

    for event in events {
        if let StreamEvent::ToolCallDelta {
            index,
            id,
            name,
            arguments_delta,
        } = event
        {
            let entry = calls.entry(*index).or_insert((None, None, String::new()));
            if let Some(id) = id {
                entry.0 = Some(id.clone());
            }
            if let Some(name) = name {
                entry.1 = Some(name.clone());
            }
            entry.2.push_str(arguments_delta);
        }
    }

    calls
        .into_values()
        .filter_map(|(id, name, arguments)| Some(ToolCall::new(id?, name?, arguments)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            index,
            id: id.map(Into::into),
            name: name.map(Into::into),
            arguments_delta: args.into(),
        }
    }

    #[test]
    fn decoder_emits_text_and_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b": keep-alive\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
              data: [DONE]\n",
        );
        assert_eq!(text_of(&events), "Hello");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        assert_eq!(text_of(&events), "héllo");
    }

    #[test]
    fn decoder_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(
            decoder
                .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}")
                .is_empty()
        );
        let events = decoder.finish();
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("x".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn decoder_surfaces_in_stream_errors() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n");
        assert_eq!(stream_error(&events), Some("overloaded"));
    }

    #[test]
    fn decoder_skips_malformed_payloads() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {not json}\n").is_empty());
    }

    #[test]
    fn decoder_parses_tool_call_deltas() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"read_file\",\"arguments\":\"{\\\"pa\"}}]}}]}\n\
              data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"th\\\":\\\"a.rs\\\"}\"}}]}}]}\n",
        );
        let calls = assemble_tool_calls(&events);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, r#"{"path":"a.rs"}"#);
    }

    #[test]
    fn assemble_joins_fragments_by_index() {
        let events = vec![
            delta(1, Some("c2"), Some("write_file"), r#"{"path":"b"#),
            delta(0, Some("c1"), Some("read_file"), r#"{"path":"a"}"#),
            delta(1, None, None, r#"","content":""}"#),
            StreamEvent::Done,
        ];
        let calls = assemble_tool_calls(&events);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[1].function.name, "write_file");
        assert_eq!(calls[1].function.arguments, r#"{"path":"b","content":""}"#);
    }

    #[test]
    fn assemble_drops_calls_without_name() {
        let events = vec![delta(0, Some("c1"), None, "{}")];
        assert!(assemble_tool_calls(&events).is_empty());
    }

    #[test]
    fn usage_is_taken_from_last_event() {
        let usage = UsageInfo {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        };
        let events = vec![StreamEvent::Usage(usage.clone()), StreamEvent::Done];
        assert_eq!(extract_usage(&events), Some(usage));
        assert_eq!(extract_usage(&[StreamEvent::Done]), None);
    }
}
