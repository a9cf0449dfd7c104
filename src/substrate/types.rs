//! Request/response shapes for the substrate HTTP API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CreateBasketRequest {
    pub workspace_id: Uuid,
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBasketResponse {
    pub basket_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Block {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub semantic_type: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDumpRequest {
    pub basket_id: Uuid,
    pub content: String,
    /// Deterministic hash of `content`; duplicate submissions resolve to
    /// the same row on the substrate side.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDumpResponse {
    pub dump_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateWorkOutputRequest {
    pub basket_id: Uuid,
    pub work_ticket_id: Uuid,
    pub agent_kind: String,
    pub output_type: String,
    pub title: String,
    pub body: serde_json::Value,
    pub confidence: f32,
    pub source_context_ids: Vec<Uuid>,
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkOutputResponse {
    pub id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListWorkOutputsFilter {
    pub work_ticket_id: Option<Uuid>,
    pub supervision_status: Option<String>,
    pub agent_kind: Option<String>,
    pub output_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateWorkOutputRequest {
    pub supervision_status: String,
    pub reviewer_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkOutputPromotedRequest {
    pub proposal_id: Uuid,
    pub method: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipPromotionRequest {
    pub user_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProposalRequest {
    pub basket_id: Uuid,
    pub ops: Vec<ProposalOp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalOp {
    #[serde(rename = "type")]
    pub op_type: String,
    pub semantic_type: String,
    pub title: String,
    pub content: String,
    pub confidence: f32,
    pub source_context_ids: Vec<Uuid>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProposalResponse {
    pub proposal_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateBlockRequest {
    pub basket_id: Uuid,
    pub semantic_type: String,
    pub anchor_role: String,
    pub title: String,
    pub content: String,
    pub confidence: f32,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlockResponse {
    pub block_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReferenceAsset {
    pub id: Uuid,
    pub title: String,
    pub permanence: String,
    pub signed_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateWorkRequest {
    pub basket_id: Uuid,
    pub work_mode: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkStatusResponse {
    pub work_id: Uuid,
    pub status: String,
}

/// Context item as read from / written to the substrate service — not
/// persisted by this crate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextItem {
    pub item_type: String,
    pub item_key: Option<String>,
    pub tier: String,
    pub content: serde_json::Value,
    pub completeness_score: f32,
    pub status: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteContextRequest {
    pub basket_id: Uuid,
    pub item_type: String,
    pub item_key: Option<String>,
    pub tier: String,
    pub content: serde_json::Value,
    pub title: Option<String>,
    pub completeness_score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteContextResponse {
    /// "upserted" or "proposed" (foundation-tier writes under governance).
    pub action: String,
    pub governance_proposal_id: Option<Uuid>,
}
