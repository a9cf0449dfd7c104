//! Work Request Recorder.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::model::{AgentKind, WorkRequest, WorkRequestStatus};

pub struct WorkRequestRecorder {
    db: Arc<dyn Database>,
}

impl WorkRequestRecorder {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Inserts a pending WorkRequest and returns it.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        user_id: &str,
        workspace_id: Uuid,
        basket_id: Uuid,
        agent_kind: AgentKind,
        work_mode: &str,
        payload: serde_json::Value,
        is_trial: bool,
    ) -> Result<WorkRequest, AppError> {
        let now = Utc::now();
        let req = WorkRequest {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            workspace_id,
            basket_id,
            agent_kind,
            work_mode: work_mode.to_string(),
            payload,
            is_trial,
            status: WorkRequestStatus::Pending,
            result_summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_work_request(&req).await?;
        Ok(req)
    }

    pub async fn mark_running(&self, id: Uuid) -> Result<(), AppError> {
        self.db.mark_work_request_running(id).await?;
        Ok(())
    }

    /// Terminal transitions are idempotent — re-marking a completed request
    /// with the same summary is a no-op; the WHERE clause in the store
    /// guards against overwriting an already-terminal row.
    pub async fn mark_completed(&self, id: Uuid, result_summary: Option<&str>) -> Result<(), AppError> {
        self.db.mark_work_request_completed(id, result_summary).await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<(), AppError> {
        self.db.mark_work_request_failed(id, error_message).await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<WorkRequest>, AppError> {
        Ok(self.db.get_work_request(id).await?)
    }
}
