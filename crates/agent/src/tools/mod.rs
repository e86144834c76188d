//! Tool registry and built-in tools

pub mod query_chat;
pub mod story;

pub use query_chat::QueryChatTool;
pub use story::StoryTool;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use quill_config::Config;
use quill_provider::{Provider, ToolCall, ToolDescriptor};

/// Failures at the tool dispatch boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Failed to parse tool arguments: {0}")]
    ArgumentParse(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Structured payload handed back to the model
    pub fn to_payload(&self) -> String {
        json!({ "error": self.to_string() }).to_string()
    }
}

#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;

    /// Reject arguments the schema does not declare
    fn strict(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

pub fn descriptor_for(tool: &dyn ToolTrait) -> ToolDescriptor {
    ToolDescriptor::new(tool.name(), tool.description(), tool.parameters()).strict(tool.strict())
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    tool: Arc<dyn ToolTrait>,
}

/// Tools available to the model, in registration order
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool; a tool with the same name is replaced in place
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let entry = RegisteredTool {
            descriptor: descriptor_for(&tool),
            tool: Arc::new(tool),
        };

        match self
            .tools
            .iter_mut()
            .find(|t| t.descriptor.name == entry.descriptor.name)
        {
            Some(existing) => {
                debug!("replacing tool {}", entry.descriptor.name);
                *existing = entry;
            }
            None => self.tools.push(entry),
        }
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.descriptor.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolTrait> {
        self.entry(name).map(|t| t.tool.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.descriptor.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Contract sent to the model on every call
    pub fn describe(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    /// Validate `args_json` against the tool's schema and run it.
    ///
    /// The tool runs on its own task so a panic surfaces as
    /// `ToolError::Execution` instead of unwinding through the caller.
    pub async fn execute(&self, name: &str, args_json: &str) -> Result<String, ToolError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = parse_arguments(&entry.descriptor, args_json)?;

        let tool = Arc::clone(&entry.tool);
        let handle =
            tokio::spawn(async move { tool.execute(args).await.map_err(|e| e.to_string()) });

        match handle.await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(message)) => Err(ToolError::Execution(message)),
            Err(e) if e.is_panic() => Err(ToolError::Execution(panic_message(e.into_panic()))),
            Err(e) => Err(ToolError::Execution(e.to_string())),
        }
    }

    /// Execute a model-requested call, rendering any failure as an error
    /// payload for the transcript
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        debug!("executing tool {} ({})", call.name, call.id);
        match self.execute(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!("tool call {} failed: {}", call.id, e);
                e.to_payload()
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the built-in tools enabled by `config`
pub fn register_default_tools(
    registry: &mut ToolRegistry,
    provider: Arc<dyn Provider>,
    config: &Config,
) {
    registry.register(QueryChatTool);

    if config.toolkit.continue_story {
        registry.register(StoryTool::from_config(provider, config));
    }
}

fn parse_arguments(descriptor: &ToolDescriptor, raw: &str) -> Result<Value, ToolError> {
    let raw = raw.trim();
    let value: Value = if raw.is_empty() {
        json!({})
    } else {
        serde_json::from_str(raw).map_err(|e| ToolError::ArgumentParse(e.to_string()))?
    };

    let args = value
        .as_object()
        .ok_or_else(|| ToolError::ArgumentParse("arguments must be a JSON object".to_string()))?;

    for required in descriptor.required() {
        if !args.contains_key(required) {
            return Err(ToolError::ArgumentParse(format!(
                "missing required property `{}`",
                required
            )));
        }
    }

    let properties = descriptor.parameters["properties"].as_object();
    for (key, val) in args {
        match properties.and_then(|p| p.get(key)) {
            Some(schema) => {
                if !matches_schema_type(val, &schema["type"]) {
                    return Err(ToolError::ArgumentParse(format!(
                        "property `{}` must be of type {}",
                        key, schema["type"]
                    )));
                }
            }
            None if descriptor.rejects_unknown_properties() => {
                return Err(ToolError::ArgumentParse(format!(
                    "unexpected property `{}`",
                    key
                )));
            }
            None => {}
        }
    }

    Ok(value)
}

fn matches_schema_type(value: &Value, expected: &Value) -> bool {
    match expected {
        Value::String(t) => matches_type_name(value, t),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| matches_type_name(value, t)),
        _ => true,
    }
}

fn matches_type_name(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map_or(false, |f| f.is_finite() && f.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("tool panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("tool panicked: {}", s)
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(strict: bool) -> ToolDescriptor {
        ToolDescriptor::new(
            "lookup",
            "Look up a term",
            json!({
                "type": "object",
                "properties": {
                    "term": {"type": "string"},
                    "limit": {"type": "integer"},
                    "note": {"type": ["string", "null"]}
                },
                "required": ["term"]
            }),
        )
        .strict(strict)
    }

    #[test]
    fn test_parse_arguments_accepts_valid_object() {
        let args = parse_arguments(&descriptor(true), r#"{"term": "dragon", "limit": 3}"#).unwrap();
        assert_eq!(args["term"], "dragon");
        assert_eq!(args["limit"], 3);
    }

    #[test]
    fn test_parse_arguments_rejects_invalid_json() {
        let err = parse_arguments(&descriptor(false), "{term: dragon").unwrap_err();
        assert!(matches!(err, ToolError::ArgumentParse(_)));
    }

    #[test]
    fn test_parse_arguments_rejects_non_object() {
        let err = parse_arguments(&descriptor(false), r#"["dragon"]"#).unwrap_err();
        assert_eq!(
            err,
            ToolError::ArgumentParse("arguments must be a JSON object".to_string())
        );
    }

    #[test]
    fn test_parse_arguments_missing_required() {
        let err = parse_arguments(&descriptor(false), "{}").unwrap_err();
        assert_eq!(
            err,
            ToolError::ArgumentParse("missing required property `term`".to_string())
        );
        // Empty text is treated as an empty object
        assert!(parse_arguments(&descriptor(false), "  ").is_err());
    }

    #[test]
    fn test_parse_arguments_type_mismatch() {
        let err = parse_arguments(&descriptor(false), r#"{"term": 42}"#).unwrap_err();
        assert!(err.to_string().contains("property `term` must be of type"));

        let err = parse_arguments(&descriptor(false), r#"{"term": "x", "limit": 1.5}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_arguments_integral_float_is_integer() {
        assert!(parse_arguments(&descriptor(false), r#"{"term": "x", "limit": 3.0}"#).is_ok());
        assert!(parse_arguments(&descriptor(false), r#"{"term": "x", "limit": -2.0}"#).is_ok());
        assert!(parse_arguments(&descriptor(false), r#"{"term": "x", "limit": "3"}"#).is_err());
    }

    #[test]
    fn test_parse_arguments_union_types() {
        assert!(parse_arguments(&descriptor(false), r#"{"term": "x", "note": null}"#).is_ok());
        assert!(parse_arguments(&descriptor(false), r#"{"term": "x", "note": 1}"#).is_err());
    }

    #[test]
    fn test_parse_arguments_unknown_properties() {
        let raw = r#"{"term": "x", "extra": true}"#;
        assert!(parse_arguments(&descriptor(false), raw).is_ok());
        assert_eq!(
            parse_arguments(&descriptor(true), raw).unwrap_err(),
            ToolError::ArgumentParse("unexpected property `extra`".to_string())
        );
    }

    #[test]
    fn test_tool_error_payload() {
        let payload: Value =
            serde_json::from_str(&ToolError::UnknownTool("nope".to_string()).to_payload()).unwrap();
        assert_eq!(payload, json!({"error": "Unknown tool: nope"}));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "tool panicked: boom");
        assert_eq!(
            panic_message(Box::new(String::from("bang"))),
            "tool panicked: bang"
        );
        assert_eq!(panic_message(Box::new(7u8)), "tool panicked");
    }
}
