//! Core data model.
//!
//! IDs are opaque 128-bit identifiers (`Uuid`). `ContextItem` and
//! `GovernanceProposal` are not modeled here: they are owned by the
//! substrate service and only ever appear as JSON crossing the
//! `substrate` client boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the four specialist/orchestrator agent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Research,
    Content,
    Reporting,
    ThinkingPartner,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Research => "research",
            AgentKind::Content => "content",
            AgentKind::Reporting => "reporting",
            AgentKind::ThinkingPartner => "thinking_partner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(AgentKind::Research),
            "content" => Some(AgentKind::Content),
            "reporting" => Some(AgentKind::Reporting),
            "thinking_partner" => Some(AgentKind::ThinkingPartner),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProjectStatus::Active),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMode {
    Auto,
    Manual,
}

impl PromotionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionMode::Auto => "auto",
            PromotionMode::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(PromotionMode::Auto),
            "manual" => Some(PromotionMode::Manual),
            _ => None,
        }
    }
}

/// User-facing container. Owns exactly one basket (1:1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub basket_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    /// Workspace supervision settings, denormalized onto the (1:1) owning
    /// project row.
    pub promotion_mode: PromotionMode,
    pub auto_promote_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkRequestStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkRequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkRequestStatus::Completed | WorkRequestStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkRequestStatus::Pending => "pending",
            WorkRequestStatus::Running => "running",
            WorkRequestStatus::Completed => "completed",
            WorkRequestStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => WorkRequestStatus::Pending,
            "running" => WorkRequestStatus::Running,
            "completed" => WorkRequestStatus::Completed,
            "failed" => WorkRequestStatus::Failed,
            _ => return None,
        })
    }
}

/// Durable record of intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    pub id: Uuid,
    pub user_id: String,
    pub workspace_id: Uuid,
    pub basket_id: Uuid,
    pub agent_kind: AgentKind,
    pub work_mode: String,
    pub payload: serde_json::Value,
    pub is_trial: bool,
    pub status: WorkRequestStatus,
    pub result_summary: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent conversation context for one (basket, agent_kind) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: Uuid,
    pub basket_id: Uuid,
    pub workspace_id: Uuid,
    pub agent_kind: AgentKind,
    pub parent_session_id: Option<Uuid>,
    pub provider_session_handle: Option<String>,
    pub state: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkTicketStatus {
    Pending,
    Running,
    Completed,
    PendingReview,
    Failed,
}

impl WorkTicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkTicketStatus::Completed | WorkTicketStatus::PendingReview | WorkTicketStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkTicketStatus::Pending => "pending",
            WorkTicketStatus::Running => "running",
            WorkTicketStatus::Completed => "completed",
            WorkTicketStatus::PendingReview => "pending_review",
            WorkTicketStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => WorkTicketStatus::Pending,
            "running" => WorkTicketStatus::Running,
            "completed" => WorkTicketStatus::Completed,
            "pending_review" => WorkTicketStatus::PendingReview,
            "failed" => WorkTicketStatus::Failed,
            _ => return None,
        })
    }
}

/// One execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkTicket {
    pub id: Uuid,
    pub work_request_id: Uuid,
    pub agent_session_id: Uuid,
    pub basket_id: Uuid,
    pub workspace_id: Uuid,
    pub agent_kind: AgentKind,
    pub status: WorkTicketStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl WorkTicket {
    pub fn output_count(&self) -> u64 {
        self.metadata
            .get("output_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Finding,
    Recommendation,
    Insight,
    DraftContent,
    ContentVariant,
    ContentAsset,
    ReportSection,
    Document,
    Error,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Finding => "finding",
            OutputType::Recommendation => "recommendation",
            OutputType::Insight => "insight",
            OutputType::DraftContent => "draft_content",
            OutputType::ContentVariant => "content_variant",
            OutputType::ContentAsset => "content_asset",
            OutputType::ReportSection => "report_section",
            OutputType::Document => "document",
            OutputType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "finding" => OutputType::Finding,
            "recommendation" => OutputType::Recommendation,
            "insight" => OutputType::Insight,
            "draft_content" => OutputType::DraftContent,
            "content_variant" => OutputType::ContentVariant,
            "content_asset" => OutputType::ContentAsset,
            "report_section" => OutputType::ReportSection,
            "document" => OutputType::Document,
            "error" => OutputType::Error,
            _ => return None,
        })
    }

    /// Output types that may be promoted to substrate blocks.
    pub const PROMOTABLE: &'static [OutputType] = &[
        OutputType::Finding,
        OutputType::Recommendation,
        OutputType::Insight,
        OutputType::ReportSection,
    ];

    pub fn is_promotable(&self) -> bool {
        Self::PROMOTABLE.contains(self)
    }

    /// Maps to the substrate-side block `semantic_type` on promotion.
    pub fn semantic_type(&self) -> &'static str {
        match self {
            OutputType::Finding => "fact",
            OutputType::Recommendation => "action",
            OutputType::Insight => "insight",
            OutputType::ReportSection => "knowledge",
            _ => "knowledge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionStatus {
    PendingReview,
    Approved,
    Rejected,
    RevisionRequested,
}

impl SupervisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisionStatus::PendingReview => "pending_review",
            SupervisionStatus::Approved => "approved",
            SupervisionStatus::Rejected => "rejected",
            SupervisionStatus::RevisionRequested => "revision_requested",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending_review" => SupervisionStatus::PendingReview,
            "approved" => SupervisionStatus::Approved,
            "rejected" => SupervisionStatus::Rejected,
            "revision_requested" => SupervisionStatus::RevisionRequested,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMethod {
    Auto,
    Manual,
    Skipped,
}

impl PromotionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionMethod::Auto => "auto",
            PromotionMethod::Manual => "manual",
            PromotionMethod::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "auto" => PromotionMethod::Auto,
            "manual" => PromotionMethod::Manual,
            "skipped" => PromotionMethod::Skipped,
            _ => return None,
        })
    }
}

/// A structured artifact emitted by an agent during a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOutput {
    pub id: Uuid,
    pub basket_id: Uuid,
    pub work_ticket_id: Uuid,
    pub agent_kind: AgentKind,
    pub output_type: OutputType,
    pub title: String,
    pub body: serde_json::Value,
    pub confidence: f32,
    pub source_context_ids: Vec<Uuid>,
    pub tool_call_id: Option<String>,
    pub supervision_status: SupervisionStatus,
    pub promotion_method: Option<PromotionMethod>,
    pub substrate_proposal_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl WorkOutput {
    /// Invariant: promotion_method non-null ⇒ supervision_status = approved;
    /// substrate_proposal_id non-null ⇒ promotion_method ∈ {auto, manual}.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        if self.promotion_method.is_some() && self.supervision_status != SupervisionStatus::Approved
        {
            return Err("promotion_method set but supervision_status is not approved");
        }
        if self.substrate_proposal_id.is_some()
            && !matches!(
                self.promotion_method,
                Some(PromotionMethod::Auto) | Some(PromotionMethod::Manual)
            )
        {
            return Err("substrate_proposal_id set without an auto/manual promotion_method");
        }
        Ok(())
    }

    pub fn requires_review(&self) -> bool {
        self.confidence < 0.7
            || self
                .metadata
                .get("requires_review")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }
}
