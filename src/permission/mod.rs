//! Permission/Quota Gate.
//!
//! Pure read: decides whether a work request may be admitted, and as
//! what kind (subscribed vs trial), without mutating any state itself.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::model::AgentKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermissionDecision {
    pub is_subscribed: bool,
    pub remaining_trials: i64,
}

pub struct PermissionGate {
    db: Arc<dyn Database>,
    trial_cap: u32,
}

impl PermissionGate {
    pub fn new(db: Arc<dyn Database>, trial_cap: u32) -> Self {
        Self { db, trial_cap }
    }

    /// An active subscription exempts from trial counting; otherwise a
    /// per-(user, workspace) trial cap applies across all agent kinds.
    pub async fn check(
        &self,
        user_id: &str,
        workspace_id: Uuid,
        agent_kind: AgentKind,
    ) -> Result<PermissionDecision, AppError> {
        if self
            .db
            .has_active_subscription(user_id, workspace_id, agent_kind)
            .await?
        {
            return Ok(PermissionDecision {
                is_subscribed: true,
                remaining_trials: i64::from(self.trial_cap),
            });
        }

        let count = self.db.count_trial_work_requests(user_id, workspace_id).await?;
        if count >= self.trial_cap {
            return Err(AppError::PermissionDenied {
                message: "trial request cap exhausted".to_string(),
                cap: self.trial_cap,
                count,
            });
        }

        Ok(PermissionDecision {
            is_subscribed: false,
            remaining_trials: i64::from(self.trial_cap - count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::error::DatabaseError;
    use crate::model::{
        AgentSession, Project, ProjectStatus, PromotionMode, WorkRequest, WorkTicket,
        WorkTicketStatus,
    };

    struct FakeDb {
        subscribed: bool,
        trial_count: u32,
        calls: Mutex<u32>,
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
            *self.calls.lock().unwrap() += 1;
            Ok(self.subscribed)
        }
        async fn count_trial_work_requests(
            &self,
            _user_id: &str,
            _workspace_id: Uuid,
        ) -> Result<u32, DatabaseError> {
            Ok(self.trial_count)
        }
        async fn insert_work_request(&self, _r: &WorkRequest) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn get_work_request(&self, _id: Uuid) -> Result<Option<WorkRequest>, DatabaseError> {
            Ok(None)
        }
        async fn mark_work_request_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn mark_work_request_completed(
            &self,
            _id: Uuid,
            _s: Option<&str>,
        ) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn mark_work_request_failed(&self, _id: Uuid, _m: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn get_session_by_basket_agent_kind(
            &self,
            _b: Uuid,
            _a: AgentKind,
        ) -> Result<Option<AgentSession>, DatabaseError> {
            Ok(None)
        }
        async fn get_session(&self, _id: Uuid) -> Result<Option<AgentSession>, DatabaseError> {
            Ok(None)
        }
        async fn insert_session(&self, _s: &AgentSession) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn update_session_handle(&self, _id: Uuid, _h: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn update_session_state(
            &self,
            _id: Uuid,
            _s: &serde_json::Value,
        ) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn insert_ticket(&self, _t: &WorkTicket) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn get_ticket(&self, _id: Uuid) -> Result<Option<WorkTicket>, DatabaseError> {
            Ok(None)
        }
        async fn get_ticket_by_work_request(
            &self,
            _id: Uuid,
        ) -> Result<Option<WorkTicket>, DatabaseError> {
            Ok(None)
        }
        async fn mark_ticket_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn mark_ticket_terminal(
            &self,
            _id: Uuid,
            _s: WorkTicketStatus,
        ) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn increment_ticket_output_count(&self, _id: Uuid) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn subscribed_user_bypasses_trial_count() {
        let db = Arc::new(FakeDb {
            subscribed: true,
            trial_count: 999,
            calls: Mutex::new(0),
        });
        let gate = PermissionGate::new(db, 10);
        let decision = gate
            .check("user-1", Uuid::new_v4(), AgentKind::Research)
            .await
            .unwrap();
        assert!(decision.is_subscribed);
    }

    #[tokio::test]
    async fn trial_user_under_cap_is_admitted() {
        let db = Arc::new(FakeDb {
            subscribed: false,
            trial_count: 3,
            calls: Mutex::new(0),
        });
        let gate = PermissionGate::new(db, 10);
        let decision = gate
            .check("user-1", Uuid::new_v4(), AgentKind::Research)
            .await
            .unwrap();
        assert!(!decision.is_subscribed);
        assert_eq!(decision.remaining_trials, 7);
    }

    #[tokio::test]
    async fn trial_user_at_cap_is_denied() {
        let db = Arc::new(FakeDb {
            subscribed: false,
            trial_count: 10,
            calls: Mutex::new(0),
        });
        let gate = PermissionGate::new(db, 10);
        let err = gate
            .check("user-1", Uuid::new_v4(), AgentKind::Research)
            .await
            .unwrap_err();
        match err {
            AppError::PermissionDenied { cap, count, .. } => {
                assert_eq!(cap, 10);
                assert_eq!(count, 10);
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }
}
