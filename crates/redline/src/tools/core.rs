//! Tool-call results, typed arguments, and result shaping.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default size ceiling, in characters, for content returned by `read_file`.
pub const DEFAULT_READ_TRUNCATE_CHARS: usize = 4000;

// ── Results ────────────────────────────────────────────────────────

/// Outcome of one tool call, fed back to the model.
///
/// Every failure (policy refusal, bad arguments, I/O error, unknown tool)
/// is encoded here with `ok = false`; execution never panics or returns
/// `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub name: String,
    pub ok: bool,
    /// Payload on success, human-readable explanation on failure.
    pub output: String,
}

impl ToolExecutionResult {
    pub fn success(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            ok: true,
            output: output.into(),
        }
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            ok: false,
            output: output.into(),
        }
    }

    /// Text placed in the tool-result message sent back to the model.
    pub fn model_content(&self) -> String {
        if self.ok {
            self.output.clone()
        } else {
            format!("Error: {}", self.output)
        }
    }
}

// ── Typed arguments ────────────────────────────────────────────────

/// Typed arguments for `read_file`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// File path relative to the project root (e.g. 'src/main.rs').
    pub path: String,
}

/// Typed arguments for `write_file`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// File path relative to the project root (e.g. 'src/main.rs').
    pub path: String,
    /// Complete new content of the file.
    pub content: String,
}

/// Typed arguments for `delete_file`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteFileArgs {
    /// File path relative to the project root (e.g. 'src/old.rs').
    pub path: String,
}

/// Parse raw JSON arguments into a typed struct.
///
/// The error string is meant for the model, which can correct the call.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    // Some providers send an empty string for argument-less calls.
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        )
    })
}

/// Validate raw arguments against a tool's JSON Schema.
///
/// Returns `None` when valid (or when the schema itself cannot be
/// compiled), otherwise a model-facing description of every violation.
pub fn validate_tool_arguments(
    tool_name: &str,
    schema: &serde_json::Value,
    arguments: &str,
) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "invalid JSON arguments for tool '{tool_name}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema."
            ));
        }
    };

    let validator = jsonschema::validator_for(schema).ok()?;
    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{tool_name}':\n{}\n\
             Please fix the arguments and try again.",
            errors.join("\n")
        ))
    }
}

// ── Truncation ─────────────────────────────────────────────────────

/// Cut `s` to at most `max_chars` characters, appending a marker that
/// states how many characters were dropped.
pub fn truncate_output(s: String, max_chars: usize) -> String {
    let total = s.chars().count();
    if total <= max_chars {
        return s;
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}\n...[truncated {} chars]", total - max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_schema_for;

    #[test]
    fn model_content_prefixes_failures() {
        let ok = ToolExecutionResult::success("c1", "read_file", "body");
        assert_eq!(ok.model_content(), "body");
        let err = ToolExecutionResult::failure("c2", "write_file", "read it first");
        assert_eq!(err.model_content(), "Error: read it first");
        assert!(!err.ok);
    }

    #[test]
    fn truncate_leaves_short_output_alone() {
        assert_eq!(truncate_output("short".into(), 10), "short");
        assert_eq!(truncate_output("exact".into(), 5), "exact");
    }

    #[test]
    fn truncate_marks_dropped_chars() {
        let long = "x".repeat(4010);
        let out = truncate_output(long, DEFAULT_READ_TRUNCATE_CHARS);
        assert!(out.starts_with(&"x".repeat(4000)));
        assert!(out.ends_with("...[truncated 10 chars]"));
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let out = truncate_output("ééééé".into(), 2);
        assert_eq!(out, "éé\n...[truncated 3 chars]");
    }

    #[test]
    fn parse_typed_write_args() {
        let args: WriteFileArgs = parse_tool_args(r#"{"path":"a.rs","content":"x"}"#).unwrap();
        assert_eq!(args.path, "a.rs");
        assert_eq!(args.content, "x");
    }

    #[test]
    fn parse_reports_missing_fields() {
        let err = parse_tool_args::<WriteFileArgs>(r#"{"path":"a.rs"}"#).unwrap_err();
        assert!(err.contains("content"), "{err}");
        assert!(parse_tool_args::<ReadFileArgs>("").is_err());
    }

    #[test]
    fn validation_catches_wrong_types() {
        let schema = json_schema_for::<ReadFileArgs>();
        assert!(validate_tool_arguments("read_file", &schema, r#"{"path":"a"}"#).is_none());
        let err = validate_tool_arguments("read_file", &schema, r#"{"path":42}"#).unwrap();
        assert!(err.contains("read_file"));
        assert!(validate_tool_arguments("read_file", &schema, "{not json").is_some());
    }
}
