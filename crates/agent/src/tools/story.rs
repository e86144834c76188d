//! Story continuation tool backed by a second model call

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use quill_config::Config;
use quill_provider::{object_schema, ChatParams, Message, Provider, ToolChoice};

use super::ToolTrait;
use crate::prompt::STORY_SYSTEM_PROMPT;

/// Asks the model for the next paragraph of a passage
pub struct StoryTool {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl StoryTool {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self {
            provider,
            model: config.model_name(),
            max_tokens: config.model.max_tokens,
            temperature: config.model.temperature,
        }
    }
}

#[derive(Deserialize)]
struct StoryArgs {
    passage: String,
}

#[async_trait]
impl ToolTrait for StoryTool {
    fn name(&self) -> &str {
        "continue_story"
    }

    fn description(&self) -> &str {
        "Write the next paragraph of a piece of literature."
    }

    fn parameters(&self) -> Value {
        object_schema(&[("passage", "The story so far", true)])
    }

    fn strict(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let args: StoryArgs = serde_json::from_value(args)?;
        debug!("continuing story from {} chars", args.passage.len());

        let params = ChatParams {
            model: self.model.clone(),
            messages: vec![
                Message::system(STORY_SYSTEM_PROMPT),
                Message::user(args.passage),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tool_choice: ToolChoice::None,
            ..Default::default()
        };

        let response = self.provider.chat(params).await?;
        let paragraph = response
            .text_content()
            .ok_or("model returned no paragraph")?;
        Ok(paragraph.to_string())
    }
}
