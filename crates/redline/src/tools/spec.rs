//! Structured tool descriptions with usage guidance.
//!
//! A `ToolSpec` turns purpose, when-to-use, when-not-to-use and output
//! notes into the single description string the function-calling API
//! expects. The file tools lean on `when_not_to_use` to steer the model
//! away from re-reading files it already has.

use crate::ToolDef;

/// A structured tool specification.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Tool name, unique among advertised tools.
    pub name: String,
    /// One-sentence imperative purpose.
    pub purpose: String,
    pub when_to_use: String,
    pub when_not_to_use: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
    /// Usage examples as (input, expected behavior) pairs.
    pub examples: Vec<(String, String)>,
    pub output_format: String,
}

impl ToolSpec {
    pub fn builder(name: impl Into<String>) -> ToolSpecBuilder {
        ToolSpecBuilder {
            spec: ToolSpec {
                name: name.into(),
                purpose: String::new(),
                when_to_use: String::new(),
                when_not_to_use: String::new(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
                examples: Vec::new(),
                output_format: "Plain text".into(),
            },
        }
    }

    /// Render the structured fields as the model-facing description.
    pub fn to_description(&self) -> String {
        let mut desc = format!("{}.", self.purpose);
        if !self.when_to_use.is_empty() {
            desc.push_str(&format!("\nWhen to use: {}", self.when_to_use));
        }
        if !self.when_not_to_use.is_empty() {
            desc.push_str(&format!("\nWhen NOT to use: {}", self.when_not_to_use));
        }
        if !self.examples.is_empty() {
            desc.push_str("\nExamples:");
            for (input, output) in &self.examples {
                desc.push_str(&format!("\n  - Input: {input} → {output}"));
            }
        }
        desc.push_str(&format!("\nOutput format: {}", self.output_format));
        desc
    }

    pub fn to_tool_def(&self) -> ToolDef {
        ToolDef::new(
            self.name.clone(),
            self.to_description(),
            self.parameters.clone(),
        )
    }
}

/// Builder for [`ToolSpec`]. Unset text fields are omitted from the
/// description; unset parameters default to an empty object schema.
pub struct ToolSpecBuilder {
    spec: ToolSpec,
}

impl ToolSpecBuilder {
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.spec.purpose = purpose.into();
        self
    }

    pub fn when_to_use(mut self, when: impl Into<String>) -> Self {
        self.spec.when_to_use = when.into();
        self
    }

    pub fn when_not_to_use(mut self, when_not: impl Into<String>) -> Self {
        self.spec.when_not_to_use = when_not.into();
        self
    }

    /// Derive the parameter schema from a `schemars::JsonSchema` type so the
    /// schema and the deserialization target cannot diverge.
    pub fn parameters_for<T: schemars::JsonSchema>(mut self) -> Self {
        self.spec.parameters = crate::json_schema_for::<T>();
        self
    }

    pub fn example(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.spec.examples.push((input.into(), output.into()));
        self
    }

    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.spec.output_format = format.into();
        self
    }

    pub fn build(self) -> ToolSpec {
        self.spec
    }
}
