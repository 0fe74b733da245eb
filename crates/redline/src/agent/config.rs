//! Configuration for a [`Session`](super::session::Session).
//!
//! ```ignore
//! let config = SessionConfig::new("anthropic/claude-sonnet-4")
//!     .with_credential(std::env::var("OPENROUTER_KEY").ok())
//!     .with_max_rounds(12)
//!     .with_temperature(0.2)
//!     .with_retries(2);
//! ```

use crate::DEFAULT_MODEL;
use crate::api::retry::RetryConfig;
use crate::diff::DEFAULT_CONTEXT_LINES;
use crate::tools::DEFAULT_READ_TRUNCATE_CHARS;

/// Default cap on model rounds per turn.
pub const DEFAULT_MAX_ROUNDS: u32 = 8;

/// Settings for every turn a session runs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier (e.g. `"anthropic/claude-sonnet-4"`).
    pub model: String,
    /// Provider credential. `send` refuses to start a turn without one.
    pub credential: Option<String>,
    pub system_prompt: String,
    /// Maximum model rounds (stream, then run tools) in one turn.
    pub max_rounds: u32,
    /// Maximum tokens per model response. 0 leaves the provider default.
    pub max_tokens: u32,
    /// Sampling temperature. 0.0 leaves the provider default.
    pub temperature: f32,
    /// Character ceiling for `read_file` output.
    pub read_truncate_chars: usize,
    /// Unchanged lines around each hunk in `diff_text`.
    pub context_lines: usize,
    /// Retry for transient failures establishing the stream.
    pub retry: RetryConfig,
    /// Validate tool arguments against their JSON Schema before executing.
    pub validate_tool_args: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            credential: None,
            system_prompt: default_system_prompt(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_tokens: 8192,
            temperature: 0.0,
            read_truncate_chars: DEFAULT_READ_TRUNCATE_CHARS,
            context_lines: DEFAULT_CONTEXT_LINES,
            retry: RetryConfig::default(),
            validate_tool_args: true,
        }
    }
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_read_truncate_chars(mut self, max: usize) -> Self {
        self.read_truncate_chars = max;
        self
    }

    pub fn with_context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Retry transient stream-establishment failures up to `max_retries` times.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }

    pub fn with_tool_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_tool_args = enabled;
        self
    }
}

/// System prompt describing the file tools and the read-before-write rule.
pub fn default_system_prompt() -> String {
    "You are a coding assistant working inside the user's project. \
     Use read_file, write_file and delete_file to inspect and change files. \
     Paths are relative to the project root. \
     Always read an existing file before overwriting it; writes to files you \
     have not read in this turn are refused. \
     write_file replaces the whole file, so send the complete new content. \
     Do not re-read a file you already read in this turn. \
     When you are done, summarize the changes you made."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_rounds, 8);
        assert_eq!(config.read_truncate_chars, 4000);
        assert_eq!(config.context_lines, 3);
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.credential.is_none());
        assert!(config.validate_tool_args);
    }

    #[test]
    fn builder_overrides() {
        let config = SessionConfig::new("m")
            .with_credential(Some("key".into()))
            .with_max_rounds(2)
            .with_retries(3)
            .with_context_lines(1);
        assert_eq!(config.model, "m");
        assert_eq!(config.credential.as_deref(), Some("key"));
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.context_lines, 1);
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let config = SessionConfig::default().with_credential(Some("  ".into()));
        assert!(config.credential.is_none());
    }
}
