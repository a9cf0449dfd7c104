//! Database abstraction layer.
//!
//! The core exclusively owns Projects, WorkRequests, AgentSessions,
//! WorkTickets and WorkOutputs. ContextItems and GovernanceProposals are
//! owned by the substrate service and never reach this trait.

mod postgres;

pub use postgres::Store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    AgentKind, AgentSession, Project, ProjectStatus, PromotionMode, WorkRequest, WorkTicket,
    WorkTicketStatus,
};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Workspaces ---

    async fn ensure_workspace(&self, id: Uuid, name: &str) -> Result<(), DatabaseError>;

    // --- Projects ---

    async fn create_project(&self, project: &Project) -> Result<(), DatabaseError>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, DatabaseError>;

    async fn get_project_by_basket(&self, basket_id: Uuid) -> Result<Option<Project>, DatabaseError>;

    async fn list_projects_for_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<Project>, DatabaseError>;

    async fn update_project_status(
        &self,
        id: Uuid,
        status: ProjectStatus,
    ) -> Result<(), DatabaseError>;

    async fn update_project_promotion_settings(
        &self,
        id: Uuid,
        mode: PromotionMode,
        auto_promote_types: &[String],
    ) -> Result<(), DatabaseError>;

    // --- Permission/Quota Gate inputs ---

    async fn has_active_subscription(
        &self,
        user_id: &str,
        workspace_id: Uuid,
        agent_kind: AgentKind,
    ) -> Result<bool, DatabaseError>;

    async fn count_trial_work_requests(
        &self,
        user_id: &str,
        workspace_id: Uuid,
    ) -> Result<u32, DatabaseError>;

    // --- Work Requests ---

    async fn insert_work_request(&self, req: &WorkRequest) -> Result<(), DatabaseError>;

    async fn get_work_request(&self, id: Uuid) -> Result<Option<WorkRequest>, DatabaseError>;

    async fn mark_work_request_running(&self, id: Uuid) -> Result<(), DatabaseError>;

    async fn mark_work_request_completed(
        &self,
        id: Uuid,
        result_summary: Option<&str>,
    ) -> Result<(), DatabaseError>;

    async fn mark_work_request_failed(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<(), DatabaseError>;

    // --- Agent Sessions ---

    async fn get_session_by_basket_agent_kind(
        &self,
        basket_id: Uuid,
        agent_kind: AgentKind,
    ) -> Result<Option<AgentSession>, DatabaseError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<AgentSession>, DatabaseError>;

    async fn insert_session(&self, session: &AgentSession) -> Result<(), DatabaseError>;

    async fn update_session_handle(&self, id: Uuid, handle: &str) -> Result<(), DatabaseError>;

    async fn update_session_state(
        &self,
        id: Uuid,
        state: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    // --- Work Tickets ---

    async fn insert_ticket(&self, ticket: &WorkTicket) -> Result<(), DatabaseError>;

    async fn get_ticket(&self, id: Uuid) -> Result<Option<WorkTicket>, DatabaseError>;

    async fn get_ticket_by_work_request(
        &self,
        work_request_id: Uuid,
    ) -> Result<Option<WorkTicket>, DatabaseError>;

    async fn mark_ticket_running(&self, id: Uuid) -> Result<(), DatabaseError>;

    async fn mark_ticket_terminal(
        &self,
        id: Uuid,
        status: WorkTicketStatus,
    ) -> Result<(), DatabaseError>;

    async fn increment_ticket_output_count(&self, id: Uuid) -> Result<(), DatabaseError>;

    // WorkOutput rows are owned by the substrate service and reached only
    // through `substrate::SubstrateClient`; this trait has no WorkOutput
    // persistence methods.
}
