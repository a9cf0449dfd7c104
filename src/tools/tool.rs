//! Tool trait and execution context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Database;
use crate::model::AgentKind;
use crate::recipe::RecipeCatalog;
use crate::substrate::{AuthOverride, SubstrateClient};
use crate::ticket::TicketAdmission;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not implemented locally: {0}")]
    ProviderHosted(String),
}

impl From<crate::error::SubstrateError> for ToolError {
    fn from(e: crate::error::SubstrateError) -> Self {
        ToolError::ExecutionFailed(e.to_string())
    }
}

impl From<crate::error::DatabaseError> for ToolError {
    fn from(e: crate::error::DatabaseError) -> Self {
        ToolError::ExecutionFailed(e.to_string())
    }
}

/// `{basket, workspace, user, ticket, agent_kind, session, user_token}`.
#[derive(Clone)]
pub struct ToolContext {
    pub basket_id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: String,
    pub ticket_id: Uuid,
    pub agent_kind: AgentKind,
    pub session_id: Uuid,
    pub auth: AuthOverride,
    pub substrate: Arc<SubstrateClient>,
    pub db: Arc<dyn Database>,
    pub config: Arc<AppConfig>,
    pub recipes: Arc<RecipeCatalog>,
    pub ticket_admission: Arc<dyn TicketAdmission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.input_schema = parameters;
        self
    }
}

/// One entry in the tool catalog. Handlers receive raw JSON args and
/// a [`ToolContext`]; the dispatcher is responsible for routing by name.
#[async_trait::async_trait]
pub trait WorkTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ToolSchema;

    /// thinking_partner is the only agent kind permitted to call
    /// `trigger_recipe`; tools default to unrestricted.
    fn allowed_for(&self, _agent_kind: AgentKind) -> bool {
        true
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError>;
}
