//! Work Ticket Executor.
//!
//! Orchestrates one ticket end to end: admission (gate → record → session →
//! insert ticket row) and execution (fetch dynamic context, drive the
//! runtime, persist terminal state). [`TicketAdmission`] is the narrow slice
//! of this component the tool layer needs — `trigger_recipe` admits new
//! tickets without ever touching the rest of the executor.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::agent::{AgentRuntime, DynamicContext, RunRequest, RuntimeOutput, TaskDirective};
use crate::config::AppConfig;
use crate::db::Database;
use crate::error::AppError;
use crate::model::{AgentKind, AgentSession, WorkTicket, WorkTicketStatus};
use crate::permission::PermissionGate;
use crate::progress::{ProgressChannel, ProgressEvent, ProgressEventType};
use crate::recipe::RecipeCatalog;
use crate::session::SessionRegistry;
use crate::substrate::types::ListWorkOutputsFilter;
use crate::substrate::{AuthOverride, SubstrateClient};
use crate::tools::{ToolCatalog, ToolContext};
use crate::work_request::WorkRequestRecorder;

/// How many prior approved outputs and context items to summarize into the
/// dynamic context block. Keeps the block bounded regardless of basket size.
const DYNAMIC_CONTEXT_SAMPLE: usize = 5;

#[derive(Debug, Clone)]
pub struct TicketAdmissionResult {
    pub work_request_id: Uuid,
    pub ticket_id: Uuid,
    pub is_trial: bool,
    pub remaining_trials: i64,
}

/// Narrow interface consumed by the `trigger_recipe` tool, kept separate
/// from the executor's own admit/execute API so the tool layer depends on
/// nothing it doesn't need.
#[async_trait]
pub trait TicketAdmission: Send + Sync {
    async fn admit_recipe(&self, req: AdmitRecipeRequest) -> Result<Uuid, AppError>;
}

pub struct AdmitRecipeRequest {
    pub user_id: String,
    pub workspace_id: Uuid,
    pub basket_id: Uuid,
    pub recipe_slug: String,
    pub parameters: serde_json::Value,
    pub priority: Option<i32>,
}

pub struct AdmitRequest {
    pub user_id: String,
    pub workspace_id: Uuid,
    pub basket_id: Uuid,
    pub agent_kind: AgentKind,
    pub work_mode: String,
    pub payload: serde_json::Value,
}

pub struct WorkTicketExecutor {
    db: Arc<dyn Database>,
    permission: Arc<PermissionGate>,
    recorder: Arc<WorkRequestRecorder>,
    sessions: Arc<SessionRegistry>,
    runtime: Arc<AgentRuntime>,
    substrate: Arc<SubstrateClient>,
    progress: Arc<ProgressChannel>,
    tools: Arc<ToolCatalog>,
    recipes: Arc<RecipeCatalog>,
    config: Arc<AppConfig>,
    cancels: AsyncMutex<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl WorkTicketExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn Database>,
        permission: Arc<PermissionGate>,
        recorder: Arc<WorkRequestRecorder>,
        sessions: Arc<SessionRegistry>,
        runtime: Arc<AgentRuntime>,
        substrate: Arc<SubstrateClient>,
        progress: Arc<ProgressChannel>,
        tools: Arc<ToolCatalog>,
        recipes: Arc<RecipeCatalog>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            permission,
            recorder,
            sessions,
            runtime,
            substrate,
            progress,
            tools,
            recipes,
            config,
            cancels: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Admission: gate → record → session → insert ticket row. The ticket
    /// is left `pending`; callers decide whether to execute it inline or
    /// hand it to a worker.
    pub async fn admit(&self, req: AdmitRequest) -> Result<TicketAdmissionResult, AppError> {
        let decision = self
            .permission
            .check(&req.user_id, req.workspace_id, req.agent_kind)
            .await?;

        let work_request = self
            .recorder
            .record(
                &req.user_id,
                req.workspace_id,
                req.basket_id,
                req.agent_kind,
                &req.work_mode,
                req.payload,
                !decision.is_subscribed,
            )
            .await?;

        let session = self
            .sessions
            .get_or_create(req.basket_id, req.workspace_id, req.agent_kind)
            .await?;

        let ticket = WorkTicket {
            id: Uuid::new_v4(),
            work_request_id: work_request.id,
            agent_session_id: session.id,
            basket_id: req.basket_id,
            workspace_id: req.workspace_id,
            agent_kind: req.agent_kind,
            status: WorkTicketStatus::Pending,
            started_at: None,
            ended_at: None,
            metadata: serde_json::json!({"output_count": 0}),
        };
        self.db.insert_ticket(&ticket).await?;

        Ok(TicketAdmissionResult {
            work_request_id: work_request.id,
            ticket_id: ticket.id,
            is_trial: !decision.is_subscribed,
            remaining_trials: decision.remaining_trials,
        })
    }

    /// Cooperative cancellation: flips the running ticket's cancel flag if
    /// it is currently executing. A no-op for tickets not in flight.
    pub async fn cancel(&self, ticket_id: Uuid) {
        if let Some(flag) = self.cancels.lock().await.get(&ticket_id) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Drives one ticket through the full execution procedure.
    pub async fn execute(self: &Arc<Self>, ticket_id: Uuid, auth: AuthOverride) -> Result<WorkTicketStatus, AppError> {
        let ticket = self
            .db
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("work ticket {ticket_id}")))?;

        if ticket.status != WorkTicketStatus::Pending {
            return Err(AppError::Conflict(format!(
                "ticket {ticket_id} is not pending (status: {})",
                ticket.status.as_str()
            )));
        }

        let work_request = self
            .db
            .get_work_request(ticket.work_request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("work request {}", ticket.work_request_id)))?;

        self.db.mark_ticket_running(ticket_id).await?;
        self.recorder.mark_running(work_request.id).await?;
        self.progress
            .emit(ProgressEvent::new(ticket_id, ProgressEventType::Progress).with_step("running"))
            .await;

        let session = self
            .sessions
            .get(ticket.agent_session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("agent session {}", ticket.agent_session_id)))?;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels.lock().await.insert(ticket_id, Arc::clone(&cancel));

        let outcome = self
            .run_ticket(&ticket, &work_request, &session, &auth, Arc::clone(&cancel))
            .await;

        self.cancels.lock().await.remove(&ticket_id);

        let status = match outcome {
            Ok(runtime_output) => {
                for _ in &runtime_output.work_outputs {
                    self.db.increment_ticket_output_count(ticket_id).await?;
                }

                let status = if runtime_output.checkpoint_raised {
                    WorkTicketStatus::PendingReview
                } else {
                    WorkTicketStatus::Completed
                };

                self.db.mark_ticket_terminal(ticket_id, status).await?;
                self.recorder
                    .mark_completed(work_request.id, Some(&runtime_output.response_text))
                    .await?;

                let event_type = if status == WorkTicketStatus::PendingReview {
                    ProgressEventType::Progress
                } else {
                    ProgressEventType::Completed
                };
                self.progress
                    .emit(
                        ProgressEvent::new(ticket_id, event_type)
                            .with_step(status.as_str())
                            .with_payload(serde_json::json!({
                                "iterations": runtime_output.iterations,
                                "hit_iteration_cap": runtime_output.hit_iteration_cap,
                                "output_count": runtime_output.work_outputs.len(),
                            })),
                    )
                    .await;
                if status == WorkTicketStatus::PendingReview {
                    self.progress
                        .emit(ProgressEvent::new(ticket_id, ProgressEventType::Completed).with_step("pending_review"))
                        .await;
                }

                status
            }
            Err(err) => {
                self.db
                    .mark_ticket_terminal(ticket_id, WorkTicketStatus::Failed)
                    .await?;
                self.recorder.mark_failed(work_request.id, &err.to_string()).await?;
                self.progress
                    .emit(
                        ProgressEvent::new(ticket_id, ProgressEventType::Failed)
                            .with_step("failed")
                            .with_payload(serde_json::json!({"error": err.to_string()})),
                    )
                    .await;
                WorkTicketStatus::Failed
            }
        };

        Ok(status)
    }

    async fn run_ticket(
        self: &Arc<Self>,
        ticket: &WorkTicket,
        work_request: &crate::model::WorkRequest,
        session: &AgentSession,
        auth: &AuthOverride,
        cancel: Arc<AtomicBool>,
    ) -> Result<RuntimeOutput, AppError> {
        let session_lock = self.sessions.execution_lock(session.id).await;
        let _guard = session_lock.lock().await;

        let dynamic_context = self
            .build_dynamic_context(ticket.basket_id, ticket.agent_kind, ticket.id, auth)
            .await;

        let context_envelope = self.fetch_context_envelope(ticket, auth).await;

        let tool_ctx = ToolContext {
            basket_id: ticket.basket_id,
            workspace_id: ticket.workspace_id,
            user_id: work_request.user_id.clone(),
            ticket_id: ticket.id,
            agent_kind: ticket.agent_kind,
            session_id: session.id,
            auth: auth.clone(),
            substrate: Arc::clone(&self.substrate),
            db: Arc::clone(&self.db),
            config: Arc::clone(&self.config),
            recipes: Arc::clone(&self.recipes),
            ticket_admission: self.as_ticket_admission(),
        };

        let task = TaskDirective {
            work_mode: work_request.work_mode.clone(),
            description: recipe_description(&self.recipes, &work_request.work_mode, ticket.agent_kind),
            parameters: work_request.payload.clone(),
        };

        let req = RunRequest {
            ticket_id: ticket.id,
            task,
            dynamic_context,
            context_envelope,
            session_handle: session.provider_session_handle.clone(),
            tool_ctx,
            cancel,
        };

        let output = self.runtime.run(req).await?;

        if let Some(handle) = &output.session_handle {
            self.sessions.set_provider_handle(session.id, handle).await?;
        }

        Ok(output)
    }

    /// Assembles the dynamic context block: referenced assets, a sample of
    /// prior approved outputs, and a top-k slice of context items, each
    /// entering as a summary rather than a whole document.
    async fn build_dynamic_context(
        &self,
        basket_id: Uuid,
        agent_kind: AgentKind,
        ticket_id: Uuid,
        auth: &AuthOverride,
    ) -> DynamicContext {
        let referenced_asset_titles = self
            .substrate
            .get_reference_assets(auth, basket_id, agent_kind.as_str(), ticket_id, None)
            .await
            .map(|assets| assets.into_iter().map(|a| a.title).collect())
            .unwrap_or_default();

        let prior_approved_output_titles = self
            .substrate
            .list_work_outputs(
                auth,
                basket_id,
                &ListWorkOutputsFilter {
                    agent_kind: Some(agent_kind.as_str().to_string()),
                    supervision_status: Some("approved".to_string()),
                    ..Default::default()
                },
            )
            .await
            .map(|outputs| {
                outputs
                    .into_iter()
                    .take(DYNAMIC_CONTEXT_SAMPLE)
                    .map(|o| o.title)
                    .collect()
            })
            .unwrap_or_default();

        let top_context_items = self
            .substrate
            .list_context(auth, basket_id, None)
            .await
            .map(|items| {
                items
                    .into_iter()
                    .take(DYNAMIC_CONTEXT_SAMPLE)
                    .map(|item| crate::agent::ContextSummary {
                        item_type: item.item_type,
                        summary: summarize(&item.content),
                    })
                    .collect()
            })
            .unwrap_or_default();

        DynamicContext {
            referenced_asset_titles,
            prior_approved_output_titles,
            top_context_items,
        }
    }

    /// Optionally fetches a pre-computed "context envelope" document and
    /// prepends it as a user message. The envelope is carried as a
    /// `context_envelope`-permanence reference asset; its title stands in
    /// for the document body, since this crate never fetches asset bytes
    /// directly.
    async fn fetch_context_envelope(&self, ticket: &WorkTicket, auth: &AuthOverride) -> Option<String> {
        let assets = self
            .substrate
            .get_reference_assets(
                auth,
                ticket.basket_id,
                ticket.agent_kind.as_str(),
                ticket.id,
                Some("context_envelope"),
            )
            .await
            .ok()?;

        if assets.is_empty() {
            return None;
        }

        let titles: Vec<_> = assets.into_iter().map(|a| a.title).collect();
        Some(format!("Context envelope:\n{}", titles.join("\n")))
    }

    fn as_ticket_admission(self: &Arc<Self>) -> Arc<dyn TicketAdmission> {
        Arc::clone(self) as Arc<dyn TicketAdmission>
    }
}

#[async_trait]
impl TicketAdmission for WorkTicketExecutor {
    async fn admit_recipe(&self, req: AdmitRecipeRequest) -> Result<Uuid, AppError> {
        let recipe = self
            .recipes
            .get(&req.recipe_slug)
            .ok_or_else(|| AppError::Validation(format!("unknown recipe: {}", req.recipe_slug)))?;

        RecipeCatalog::validate_parameters(recipe, &req.parameters).map_err(AppError::Validation)?;

        let mut payload = req.parameters;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("recipe_slug".to_string(), serde_json::json!(req.recipe_slug));
            if let Some(priority) = req.priority {
                obj.insert("priority".to_string(), serde_json::json!(priority));
            }
        }

        let admission = self
            .admit(AdmitRequest {
                user_id: req.user_id,
                workspace_id: req.workspace_id,
                basket_id: req.basket_id,
                agent_kind: recipe.agent_kind,
                work_mode: recipe.work_mode.clone(),
                payload,
            })
            .await?;

        Ok(admission.ticket_id)
    }
}

fn recipe_description(recipes: &RecipeCatalog, work_mode: &str, agent_kind: AgentKind) -> String {
    recipes
        .list(None)
        .into_iter()
        .find(|r| r.work_mode == work_mode && r.agent_kind == agent_kind)
        .map(|r| format!("Execute recipe '{}' (category: {}).", r.slug, r.category))
        .unwrap_or_else(|| format!("Execute work in mode '{work_mode}'."))
}

fn summarize(content: &serde_json::Value) -> String {
    let rendered = content.to_string();
    if rendered.chars().count() > 200 {
        format!("{}…", rendered.chars().take(200).collect::<String>())
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::model::{Project, ProjectStatus, PromotionMode, WorkRequest};
    use std::sync::Mutex as StdMutex;

    struct FakeDb {
        tickets: StdMutex<HashMap<Uuid, WorkTicket>>,
        requests: StdMutex<HashMap<Uuid, WorkRequest>>,
        sessions: StdMutex<HashMap<Uuid, AgentSession>>,
    }

    impl FakeDb {
        fn new() -> Self {
            Self {
                tickets: StdMutex::new(HashMap::new()),
                requests: StdMutex::new(HashMap::new()),
                sessions: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl Database for FakeDb {
        async fn ensure_workspace(&self, _id: Uuid, _name: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn create_project(&self, _p: &Project) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn get_project(&self, _id: Uuid) -> Result<Option<Project>, DatabaseError> {
            Ok(None)
        }
        async fn get_project_by_basket(&self, _id: Uuid) -> Result<Option<Project>, DatabaseError> {
            Ok(None)
        }
        async fn list_projects_for_workspace(&self, _id: Uuid) -> Result<Vec<Project>, DatabaseError> {
            Ok(vec![])
        }
        async fn update_project_status(&self, _id: Uuid, _s: ProjectStatus) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn update_project_promotion_settings(
            &self,
            _id: Uuid,
            _m: PromotionMode,
            _t: &[String],
        ) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn has_active_subscription(
            &self,
            _user_id: &str,
            _workspace_id: Uuid,
            _agent_kind: AgentKind,
        ) -> Result<bool, DatabaseError> {
            Ok(true)
        }
        async fn count_trial_work_requests(&self, _user_id: &str, _workspace_id: Uuid) -> Result<u32, DatabaseError> {
            Ok(0)
        }
        async fn insert_work_request(&self, r: &WorkRequest) -> Result<(), DatabaseError> {
            self.requests.lock().unwrap().insert(r.id, r.clone());
            Ok(())
        }
        async fn get_work_request(&self, id: Uuid) -> Result<Option<WorkRequest>, DatabaseError> {
            Ok(self.requests.lock().unwrap().get(&id).cloned())
        }
        async fn mark_work_request_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn mark_work_request_completed(&self, _id: Uuid, _s: Option<&str>) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn mark_work_request_failed(&self, _id: Uuid, _m: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn get_session_by_basket_agent_kind(
            &self,
            basket_id: Uuid,
            agent_kind: AgentKind,
        ) -> Result<Option<AgentSession>, DatabaseError> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .values()
                .find(|s| s.basket_id == basket_id && s.agent_kind == agent_kind)
                .cloned())
        }
        async fn get_session(&self, id: Uuid) -> Result<Option<AgentSession>, DatabaseError> {
            Ok(self.sessions.lock().unwrap().get(&id).cloned())
        }
        async fn insert_session(&self, s: &AgentSession) -> Result<(), DatabaseError> {
            self.sessions.lock().unwrap().insert(s.id, s.clone());
            Ok(())
        }
        async fn update_session_handle(&self, _id: Uuid, _h: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn update_session_state(&self, _id: Uuid, _s: &serde_json::Value) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn insert_ticket(&self, t: &WorkTicket) -> Result<(), DatabaseError> {
            self.tickets.lock().unwrap().insert(t.id, t.clone());
            Ok(())
        }
        async fn get_ticket(&self, id: Uuid) -> Result<Option<WorkTicket>, DatabaseError> {
            Ok(self.tickets.lock().unwrap().get(&id).cloned())
        }
        async fn get_ticket_by_work_request(&self, work_request_id: Uuid) -> Result<Option<WorkTicket>, DatabaseError> {
            Ok(self
                .tickets
                .lock()
                .unwrap()
                .values()
                .find(|t| t.work_request_id == work_request_id)
                .cloned())
        }
        async fn mark_ticket_running(&self, id: Uuid) -> Result<(), DatabaseError> {
            if let Some(t) = self.tickets.lock().unwrap().get_mut(&id) {
                t.status = WorkTicketStatus::Running;
                t.started_at = Some(Utc::now());
            }
            Ok(())
        }
        async fn mark_ticket_terminal(&self, id: Uuid, status: WorkTicketStatus) -> Result<(), DatabaseError> {
            if let Some(t) = self.tickets.lock().unwrap().get_mut(&id) {
                t.status = status;
                t.ended_at = Some(Utc::now());
            }
            Ok(())
        }
        async fn increment_ticket_output_count(&self, id: Uuid) -> Result<(), DatabaseError> {
            if let Some(t) = self.tickets.lock().unwrap().get_mut(&id) {
                let count = t.output_count() + 1;
                t.metadata = serde_json::json!({"output_count": count});
            }
            Ok(())
        }
    }

    fn sample_ticket(db: &FakeDb, status: WorkTicketStatus) -> Uuid {
        let id = Uuid::new_v4();
        let request_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let basket_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();
        db.requests.lock().unwrap().insert(
            request_id,
            WorkRequest {
                id: request_id,
                user_id: "user-1".to_string(),
                workspace_id,
                basket_id,
                agent_kind: AgentKind::Research,
                work_mode: "deep_dive".to_string(),
                payload: serde_json::json!({}),
                is_trial: false,
                status: crate::model::WorkRequestStatus::Pending,
                result_summary: None,
                error_message: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        db.sessions.lock().unwrap().insert(
            session_id,
            AgentSession {
                id: session_id,
                basket_id,
                workspace_id,
                agent_kind: AgentKind::Research,
                parent_session_id: None,
                provider_session_handle: None,
                state: serde_json::json!({}),
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        db.tickets.lock().unwrap().insert(
            id,
            WorkTicket {
                id,
                work_request_id: request_id,
                agent_session_id: session_id,
                basket_id,
                workspace_id,
                agent_kind: AgentKind::Research,
                status,
                started_at: None,
                ended_at: None,
                metadata: serde_json::json!({"output_count": 0}),
            },
        );
        id
    }

    #[test]
    fn recipe_description_falls_back_for_unknown_work_mode() {
        let catalog = RecipeCatalog::new();
        let description = recipe_description(&catalog, "not_a_real_mode", AgentKind::Research);
        assert!(description.contains("not_a_real_mode"));
    }

    #[test]
    fn summarize_truncates_long_content() {
        let content = serde_json::json!({"text": "x".repeat(500)});
        let summary = summarize(&content);
        assert!(summary.ends_with('…'));
        assert!(summary.len() < 500);
    }

    #[tokio::test]
    async fn sample_ticket_fixture_is_pending() {
        let db = FakeDb::new();
        let ticket_id = sample_ticket(&db, WorkTicketStatus::Pending);
        let ticket = db.get_ticket(ticket_id).await.unwrap().unwrap();
        assert_eq!(ticket.status, WorkTicketStatus::Pending);
    }
}
