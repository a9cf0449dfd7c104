//! `list_recipes`, `trigger_recipe`.

use async_trait::async_trait;
use serde_json::Value;

use crate::model::AgentKind;
use crate::recipe::RecipeCatalog;
use crate::ticket::AdmitRecipeRequest;
use crate::tools::tool::{ToolContext, ToolError, ToolSchema, WorkTool};

pub struct ListRecipesTool;

#[async_trait]
impl WorkTool for ListRecipesTool {
    fn name(&self) -> &'static str {
        "list_recipes"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "list_recipes",
            "Enumerate active recipes with their required context types and parameters.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "category": {"type": "string"}
            },
            "required": []
        }))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let category = args.get("category").and_then(|v| v.as_str());
        let recipes = ctx.recipes.list(category);
        Ok(serde_json::json!(recipes))
    }
}

pub struct TriggerRecipeTool;

#[async_trait]
impl WorkTool for TriggerRecipeTool {
    fn name(&self) -> &'static str {
        "trigger_recipe"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "trigger_recipe",
            "Admit another work request for the given recipe and return the new \
             work ticket id.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "recipe_slug": {"type": "string"},
                "parameters": {"type": "object"},
                "priority": {"type": "integer"}
            },
            "required": ["recipe_slug", "parameters"]
        }))
    }

    /// `trigger_recipe` fans work out to the specialist agents; only the
    /// thinking_partner conversation is allowed to dispatch it.
    fn allowed_for(&self, agent_kind: AgentKind) -> bool {
        agent_kind == AgentKind::ThinkingPartner
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let recipe_slug = args
            .get("recipe_slug")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParameters("recipe_slug is required".to_string()))?
            .to_string();

        let parameters = args
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let recipe = ctx
            .recipes
            .get(&recipe_slug)
            .ok_or_else(|| ToolError::InvalidParameters(format!("unknown recipe: {recipe_slug}")))?;

        RecipeCatalog::validate_parameters(recipe, &parameters)
            .map_err(ToolError::InvalidParameters)?;

        let priority = args.get("priority").and_then(|v| v.as_i64()).map(|p| p as i32);

        let ticket_id = ctx
            .ticket_admission
            .admit_recipe(AdmitRecipeRequest {
                user_id: ctx.user_id.clone(),
                workspace_id: ctx.workspace_id,
                basket_id: ctx.basket_id,
                recipe_slug,
                parameters,
                priority,
            })
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(serde_json::json!({"work_ticket_id": ticket_id}))
    }
}
