//! Request/response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AgentKind, OutputType, SupervisionStatus};

#[derive(Debug, Deserialize)]
pub struct ScaffoldBody {
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub initial_context_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunAgentBody {
    pub basket_id: Uuid,
    pub workspace_id: Uuid,
    pub agent_kind: AgentKind,
    pub work_mode: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct QueueWorkBody {
    pub basket_id: Uuid,
    pub workspace_id: Uuid,
    pub agent_kind: AgentKind,
    pub work_mode: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TpChatBody {
    pub basket_id: Uuid,
    pub workspace_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkOutputSummary {
    pub id: Uuid,
    pub output_type: OutputType,
    pub title: String,
    pub confidence: f32,
    pub supervision_status: SupervisionStatus,
}

impl From<crate::model::WorkOutput> for WorkOutputSummary {
    fn from(o: crate::model::WorkOutput) -> Self {
        Self {
            id: o.id,
            output_type: o.output_type,
            title: o.title,
            confidence: o.confidence,
            supervision_status: o.supervision_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunAgentResponse {
    pub work_request_id: Uuid,
    pub work_ticket_id: Uuid,
    pub is_trial_request: bool,
    pub remaining_trials: i64,
    pub status: String,
    pub response_text: Option<String>,
    pub outputs: Vec<WorkOutputSummary>,
}

#[derive(Debug, Serialize)]
pub struct QueueWorkResponse {
    pub work_request_id: Uuid,
    pub work_ticket_id: Uuid,
    pub is_trial_request: bool,
    pub remaining_trials: i64,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PromoteBody {
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SkipPromotionBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListOutputsQuery {
    pub supervision_status: Option<String>,
    pub agent_kind: Option<String>,
    pub output_type: Option<String>,
    pub work_ticket_id: Option<Uuid>,
}
