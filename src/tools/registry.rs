//! Name → handler registry and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::ToolSpec;
use crate::model::AgentKind;

use super::tool::{ToolContext, ToolError, WorkTool};

pub struct ToolCatalog {
    tools: HashMap<&'static str, Arc<dyn WorkTool>>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<Arc<dyn WorkTool>>) -> Self {
        let mut map = HashMap::new();
        for tool in tools {
            map.insert(tool.name(), tool);
        }
        Self { tools: map }
    }

    /// Declarations for the agent kinds permitted to call each tool
    /// (`{name, description, input_schema}`), in the dialect the LLM
    /// provider accepts.
    pub fn specs_for(&self, agent_kind: AgentKind) -> Vec<ToolSpec> {
        self.tools
            .values()
            .filter(|t| t.allowed_for(agent_kind))
            .map(|t| {
                let schema = t.schema();
                ToolSpec {
                    name: schema.name,
                    description: schema.description,
                    input_schema: schema.input_schema,
                }
            })
            .collect()
    }

    /// Dispatches one tool-use block to its handler. Returns the raw
    /// tool-result payload and an `isError` flag, which the runtime passes
    /// back to the LLM as a tool-result block.
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> (serde_json::Value, bool) {
        let Some(tool) = self.tools.get(name) else {
            return (
                serde_json::json!({"error": format!("unknown tool: {name}")}),
                true,
            );
        };

        if !tool.allowed_for(ctx.agent_kind) {
            return (
                serde_json::json!({"error": format!("{name} is not available to {}", ctx.agent_kind)}),
                true,
            );
        }

        match tool.execute(args, ctx).await {
            Ok(value) => (value, false),
            Err(ToolError::ProviderHosted(msg)) => {
                (serde_json::json!({"error": msg, "provider_hosted": true}), true)
            }
            Err(e) => (serde_json::json!({"error": e.to_string()}), true),
        }
    }
}
