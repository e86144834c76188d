//! OpenAI-compatible chat-completions client

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace, warn};

use crate::*;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
const ERROR_SNIPPET_LEN: usize = 200;

/// Chat-completions client with a request timeout and bounded retry on
/// transient transport failures
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Result<Self> {
        let api_base = api_base
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| OPENAI_API_BASE.to_string());

        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            api_key: api_key.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_retries: 1,
        })
    }

    /// Replace the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Number of extra attempts after a transient transport failure
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<serde_json::Value> = params
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": m.role.as_str() });
                // Assistant turns that only carry tool calls send null content
                obj["content"] = match &m.content {
                    Some(content) => json!(content),
                    None => serde_json::Value::Null,
                };
                if let Some(tool_calls) = &m.tool_calls {
                    obj["tool_calls"] = json!(tool_calls);
                }
                if let Some(tool_call_id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }
                if let Some(name) = &m.name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });

        if !params.tools.is_empty() {
            let tools: Vec<serde_json::Value> = params
                .tools
                .iter()
                .map(|t| {
                    let mut function = json!({
                        "name": &t.name,
                        "description": &t.description,
                        "parameters": &t.parameters
                    });
                    if t.strict {
                        function["strict"] = json!(true);
                    }
                    json!({ "type": "function", "function": function })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = match &params.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required(name) => {
                    json!({"type": "function", "function": {"name": name}})
                }
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let message = &choice["message"];
        if !message.is_object() {
            return Err(ProviderError::InvalidResponse);
        }

        let content = message["content"].as_str().map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let function = &call["function"];
                // Some compatible servers send arguments as an object
                let arguments = match &function["arguments"] {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };

                tool_calls.push(ToolCall {
                    id: call["id"].as_str().unwrap_or("").to_string(),
                    name: function["name"].as_str().unwrap_or("").to_string(),
                    arguments,
                });
            }
        }

        let usage = if let Some(usage) = json["usage"].as_object() {
            let field = |name: &str| usage.get(name).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: field("prompt_tokens"),
                completion_tokens: field("completion_tokens"),
                total_tokens: field("total_tokens"),
            }
        } else {
            Usage::default()
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }

    async fn send_once(&self, url: &str, body: &serde_json::Value) -> Result<ChatResponse> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        let body = response.text().await?;

        if !status.is_success() {
            let error = api_error_message(&body);
            return Err(ProviderError::Api(format!("{} ({})", error, status.as_u16())));
        }

        let json: serde_json::Value = serde_json::from_str(&body)?;

        debug!(
            "model responded with {} tool calls",
            json["choices"][0]["message"]["tool_calls"]
                .as_array()
                .map(|v| v.len())
                .unwrap_or(0)
        );

        self.parse_response(json)
    }
}

/// `error.message` from a JSON error body, else the start of the raw body
fn api_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = json["error"]["message"].as_str() {
            return message.to_string();
        }
    }

    let snippet: String = body.trim().chars().take(ERROR_SNIPPET_LEN).collect();
    if snippet.is_empty() {
        "unknown error".to_string()
    } else {
        snippet
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let mut attempt = 0;
        loop {
            trace!("POST {} (attempt {})", url, attempt + 1);
            match self.send_once(&url, &body).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "transient failure calling model, retrying ({}/{}): {}",
                        attempt, self.max_retries, e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                result => return result,
            }
        }
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
