//! Echo tool the model consults before answering

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use quill_provider::object_schema;

use super::ToolTrait;

/// Returns the query it was given
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryChatTool;

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

#[async_trait]
impl ToolTrait for QueryChatTool {
    fn name(&self) -> &str {
        "query_chat"
    }

    fn description(&self) -> &str {
        "Query chat and return the results."
    }

    fn parameters(&self) -> Value {
        object_schema(&[("query", "The user's input", true)])
    }

    fn strict(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let args: QueryArgs = serde_json::from_value(args)?;
        debug!("query_chat: {} chars", args.query.len());
        Ok(args.query)
    }
}
