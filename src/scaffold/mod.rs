//! Project Scaffolder.
//!
//! Transactional one-shot onboarding for a new project: gate, basket,
//! foundational intent block, optional seed dump, project row, the
//! thinking_partner session and its three specialists, and an initial
//! work request. No automatic rollback — each step is tagged so a caller
//! can choose its own cleanup strategy on partial failure.

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::model::{AgentKind, Project, ProjectStatus, PromotionMode};
use crate::permission::PermissionGate;
use crate::session::SessionRegistry;
use crate::substrate::types::CreateBasketRequest;
use crate::substrate::types::CreateBlockRequest;
use crate::substrate::{AuthOverride, SubstrateClient};
use crate::work_request::WorkRequestRecorder;

/// Every agent kind besides thinking_partner gets its own session, parented
/// to the basket's TP session.
const SPECIALISTS: [AgentKind; 3] = [AgentKind::Research, AgentKind::Content, AgentKind::Reporting];

pub struct ScaffoldRequest {
    pub user_id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub initial_context_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaffoldResult {
    pub project_id: Uuid,
    pub basket_id: Uuid,
    pub intent_block_id: Uuid,
    pub dump_id: Option<Uuid>,
    pub thinking_partner_session_id: Uuid,
    pub specialist_session_ids: Vec<Uuid>,
    pub work_request_id: Uuid,
}

/// An error tagged with the scaffolding step that produced it.
#[derive(Debug)]
pub struct ScaffoldError {
    pub step: &'static str,
    pub source: AppError,
}

impl fmt::Display for ScaffoldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scaffold failed at step '{}': {}", self.step, self.source)
    }
}

impl std::error::Error for ScaffoldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl IntoResponse for ScaffoldError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        let body = serde_json::json!({
            "error": {
                "kind": self.source.kind(),
                "message": self.source.to_string(),
                "details": {"step": self.step},
            }
        });
        (status, Json(body)).into_response()
    }
}

trait AtStep<T> {
    fn at_step(self, step: &'static str) -> Result<T, ScaffoldError>;
}

impl<T> AtStep<T> for Result<T, AppError> {
    fn at_step(self, step: &'static str) -> Result<T, ScaffoldError> {
        self.map_err(|source| ScaffoldError { step, source })
    }
}

pub struct ProjectScaffolder {
    permission: Arc<PermissionGate>,
    substrate: Arc<SubstrateClient>,
    db: Arc<dyn Database>,
    sessions: Arc<SessionRegistry>,
    recorder: Arc<WorkRequestRecorder>,
}

impl ProjectScaffolder {
    pub fn new(
        permission: Arc<PermissionGate>,
        substrate: Arc<SubstrateClient>,
        db: Arc<dyn Database>,
        sessions: Arc<SessionRegistry>,
        recorder: Arc<WorkRequestRecorder>,
    ) -> Self {
        Self {
            permission,
            substrate,
            db,
            sessions,
            recorder,
        }
    }

    pub async fn scaffold(&self, req: ScaffoldRequest) -> Result<ScaffoldResult, ScaffoldError> {
        let auth = AuthOverride::default();

        self.permission
            .check(&req.user_id, req.workspace_id, AgentKind::Research)
            .await
            .at_step("permission_check")?;

        let basket = self
            .substrate
            .create_basket(
                &auth,
                CreateBasketRequest {
                    workspace_id: req.workspace_id,
                    origin: "project_scaffold".to_string(),
                },
            )
            .await
            .map_err(AppError::from)
            .at_step("create_basket")?;
        let basket_id = basket.basket_id;

        let intent_block = self
            .substrate
            .create_block(
                &auth,
                CreateBlockRequest {
                    basket_id,
                    semantic_type: "intent".to_string(),
                    anchor_role: "intent".to_string(),
                    title: req.name.clone(),
                    content: req.description.clone().unwrap_or_default(),
                    confidence: 1.0,
                    state: "ACCEPTED".to_string(),
                },
            )
            .await
            .map_err(AppError::from)
            .at_step("create_intent_block")?;

        let dump_id = if let Some(text) = req.initial_context_text.as_deref().filter(|t| !t.is_empty()) {
            let dump = self
                .substrate
                .create_dump(&auth, basket_id, text)
                .await
                .map_err(AppError::from)
                .at_step("create_dump")?;
            Some(dump.dump_id)
        } else {
            None
        };

        let project_id = Uuid::new_v4();
        self.db
            .ensure_workspace(req.workspace_id, "")
            .await
            .map_err(AppError::from)
            .at_step("create_project")?;
        let project = Project {
            id: project_id,
            workspace_id: req.workspace_id,
            basket_id,
            name: req.name.clone(),
            description: req.description.clone(),
            status: ProjectStatus::Active,
            promotion_mode: PromotionMode::Manual,
            auto_promote_types: Vec::new(),
            created_at: Utc::now(),
        };
        self.db
            .create_project(&project)
            .await
            .map_err(AppError::from)
            .at_step("create_project")?;

        let tp_session = self
            .sessions
            .get_or_create(basket_id, req.workspace_id, AgentKind::ThinkingPartner)
            .await
            .at_step("create_sessions")?;

        let mut specialist_session_ids = Vec::with_capacity(SPECIALISTS.len());
        for kind in SPECIALISTS {
            let session = self
                .sessions
                .get_or_create(basket_id, req.workspace_id, kind)
                .await
                .at_step("create_sessions")?;
            specialist_session_ids.push(session.id);
        }

        let work_request = self
            .recorder
            .record(
                &req.user_id,
                req.workspace_id,
                basket_id,
                AgentKind::ThinkingPartner,
                "project_kickoff",
                serde_json::json!({"project_id": project_id}),
                false,
            )
            .await
            .at_step("record_work_request")?;

        Ok(ScaffoldResult {
            project_id,
            basket_id,
            intent_block_id: intent_block.block_id,
            dump_id,
            thinking_partner_session_id: tp_session.id,
            specialist_session_ids,
            work_request_id: work_request.id,
        })
    }
}
