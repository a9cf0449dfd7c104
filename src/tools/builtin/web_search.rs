//! `web_search` — provider-hosted, declared for LLM awareness only. The
//! provider executes the search itself; we never reach this
//! handler in production traffic, but it is dispatched through the same
//! catalog so a misbehaving provider that still emits a local tool-use
//! block degrades to a clean `isError` result instead of an unknown-tool
//! failure.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::tool::{ToolContext, ToolError, ToolSchema, WorkTool};

pub struct WebSearchTool;

#[async_trait]
impl WorkTool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "web_search",
            "Search the web for the given query. Provider-hosted: results \
             are returned directly to the model without a local round trip.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        Err(ToolError::ProviderHosted(
            "web_search is executed by the provider, not dispatched locally".to_string(),
        ))
    }
}
