//! Model provider layer
//!
//! Chat-completion wire types, the `Provider` trait and an
//! OpenAI-compatible HTTP client.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use thiserror::Error;

pub mod openai;

pub use openai::OpenAiProvider;

/// Errors raised while talking to the model service
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model service rejected the request: {0}")]
    Api(String),

    #[error("no API key configured")]
    NoApiKey,

    #[error("model service returned an unusable response")]
    InvalidResponse,

    #[error("rate limited by model service")]
    RateLimited,
}

impl ProviderError {
    /// Transport failures worth a second attempt
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Author of a message in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function invocation requested by the model.
///
/// `arguments` is the JSON text exactly as the model produced it; parsing
/// and validation happen at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Form recorded on the assistant message
    pub fn to_def(&self) -> ToolCallDef {
        ToolCallDef::new(&self.id, &self.name, &self.arguments)
    }
}

/// Model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    /// Non-empty text content, if any
    pub fn text_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Assistant turn that requests tool calls
    pub fn assistant_with_tool_calls(content: Option<String>, calls: &[ToolCall]) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(calls.iter().map(ToolCall::to_def).collect()),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Ids of the tool calls carried by this message
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(|c| c.id.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Tool call as it appears inside an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDef {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCallDef {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Contract advertised to the model for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default)]
    pub strict: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Properties listed under `required`
    pub fn required(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether undeclared properties must be rejected
    pub fn rejects_unknown_properties(&self) -> bool {
        self.strict || self.parameters["additionalProperties"] == Value::Bool(false)
    }
}

/// Request parameters
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Tool selection mode
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    Auto,
    Required(String),
    None,
}

/// A chat-completion backend
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

/// Build a strict object schema from `(name, description, required)` string
/// properties
pub fn object_schema(properties: &[(&str, &str, bool)]) -> Value {
    let mut props = serde_json::Map::new();
    let mut required = Vec::new();

    for (name, description, is_required) in properties {
        props.insert(
            name.to_string(),
            serde_json::json!({
                "type": "string",
                "description": description
            }),
        );
        if *is_required {
            required.push(name.to_string());
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": props,
        "required": required,
        "additionalProperties": false
    })
}
