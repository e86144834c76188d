//! Shared fixtures for agent integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mockall::{mock, Sequence};
use serde_json::{json, Value};

use quill_agent::ToolTrait;
use quill_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall};

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

/// Provider that returns `responses` in order, one per call
pub fn scripted(responses: Vec<Result<ChatResponse, ProviderError>>) -> MockProvider {
    let mut mock = MockProvider::new();
    let mut seq = Sequence::new();

    for response in responses {
        let mut slot = Some(response);
        mock.expect_chat()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| slot.take().expect("response already used"));
    }

    mock
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ChatResponse {
    ChatResponse::with_tool_calls(None, vec![ToolCall::new(id, name, arguments)])
}

/// Tool that counts invocations and returns a fixed answer
pub struct CountingTool {
    pub calls: Arc<AtomicUsize>,
    pub answer: String,
}

impl CountingTool {
    pub fn new(answer: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                answer: answer.to_string(),
            },
            calls,
        )
    }
}

#[async_trait]
impl ToolTrait for CountingTool {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Look up a term"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "term": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["term"]
        })
    }

    async fn execute(
        &self,
        _args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// Tool that always returns an error
pub struct FailingTool;

#[async_trait]
impl ToolTrait for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Err("disk on fire".into())
    }
}

/// Tool that panics when run
pub struct PanickingTool;

#[async_trait]
impl ToolTrait for PanickingTool {
    fn name(&self) -> &str {
        "panicking"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        panic!("tool blew up")
    }
}
