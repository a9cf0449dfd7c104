//! Session Registry.
//!
//! Persists one `AgentSession` per (basket, agent_kind) pair, and hands out
//! a per-session execution lock so a ticket's tool loop runs with exclusive
//! access to its session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::model::AgentKind;

pub use crate::model::AgentSession;

pub struct SessionRegistry {
    db: Arc<dyn Database>,
    locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// For any agent_kind other than thinking_partner, the basket's
    /// thinking_partner session is resolved or created first and becomes
    /// the parent.
    pub async fn get_or_create(
        &self,
        basket_id: Uuid,
        workspace_id: Uuid,
        agent_kind: AgentKind,
    ) -> Result<AgentSession, AppError> {
        if let Some(existing) = self
            .db
            .get_session_by_basket_agent_kind(basket_id, agent_kind)
            .await?
        {
            return Ok(existing);
        }

        let parent_session_id = if agent_kind == AgentKind::ThinkingPartner {
            None
        } else {
            let tp = Box::pin(self.get_or_create(basket_id, workspace_id, AgentKind::ThinkingPartner))
                .await?;
            Some(tp.id)
        };

        let now = Utc::now();
        let session = AgentSession {
            id: Uuid::new_v4(),
            basket_id,
            workspace_id,
            agent_kind,
            parent_session_id,
            provider_session_handle: None,
            state: serde_json::json!({}),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_session(&session).await?;

        // The insert is `ON CONFLICT (basket_id, agent_kind) DO NOTHING`, so a
        // concurrent creator may have won the race; re-read the canonical row.
        self.db
            .get_session_by_basket_agent_kind(basket_id, agent_kind)
            .await?
            .ok_or_else(|| AppError::Internal("session vanished after insert".to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AgentSession>, AppError> {
        Ok(self.db.get_session(id).await?)
    }

    pub async fn set_provider_handle(&self, id: Uuid, handle: &str) -> Result<(), AppError> {
        self.db.update_session_handle(id, handle).await?;
        Ok(())
    }

    pub async fn set_state(&self, id: Uuid, state: &serde_json::Value) -> Result<(), AppError> {
        self.db.update_session_state(id, state).await?;
        Ok(())
    }

    /// Exclusive execution lock for one session, held for the duration of a
    /// ticket's tool loop. Double-checked locking, same pattern as a
    /// conversation-thread registry.
    pub async fn execution_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&session_id) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.locks.write().await;
        if let Some(lock) = locks.get(&session_id) {
            return Arc::clone(lock);
        }

        let lock = Arc::new(Mutex::new(()));
        locks.insert(session_id, Arc::clone(&lock));
        lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::model::{AgentKind, AgentSession};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// In-memory `Database` stub covering only the session methods this
    /// registry calls, mirroring the `(basket_id, agent_kind) DO NOTHING`
    /// upsert semantics documented in `get_or_create`.
    struct FakeDb {
        sessions: StdMutex<HashMap<Uuid, AgentSession>>,
    }

    impl FakeDb {
        fn new() -> Self {
            Self {
                sessions: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl Database for FakeDb {
        async fn ensure_workspace(&self, _id: Uuid, _name: &str) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn create_project(&self, _p: &crate::model::Project) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_project(&self, _id: Uuid) -> Result<Option<crate::model::Project>, DatabaseError> {
            unreachable!()
        }
        async fn get_project_by_basket(
            &self,
            _id: Uuid,
        ) -> Result<Option<crate::model::Project>, DatabaseError> {
            unreachable!()
        }
        async fn list_projects_for_workspace(
            &self,
            _id: Uuid,
        ) -> Result<Vec<crate::model::Project>, DatabaseError> {
            unreachable!()
        }
        async fn update_project_status(
            &self,
            _id: Uuid,
            _s: crate::model::ProjectStatus,
        ) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn update_project_promotion_settings(
            &self,
            _id: Uuid,
            _m: crate::model::PromotionMode,
            _t: &[String],
        ) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn has_active_subscription(
            &self,
            _user_id: &str,
            _workspace_id: Uuid,
            _agent_kind: AgentKind,
        ) -> Result<bool, DatabaseError> {
            unreachable!()
        }
        async fn count_trial_work_requests(&self, _user_id: &str, _workspace_id: Uuid) -> Result<u32, DatabaseError> {
            unreachable!()
        }
        async fn insert_work_request(&self, _r: &crate::model::WorkRequest) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_work_request(&self, _id: Uuid) -> Result<Option<crate::model::WorkRequest>, DatabaseError> {
            unreachable!()
        }
        async fn mark_work_request_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn mark_work_request_completed(&self, _id: Uuid, _s: Option<&str>) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn mark_work_request_failed(&self, _id: Uuid, _m: &str) -> Result<(), DatabaseError> {
            unreachable!()
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
            let mut sessions = self.sessions.lock().unwrap();
            let exists = sessions
                .values()
                .any(|existing| existing.basket_id == s.basket_id && existing.agent_kind == s.agent_kind);
            if !exists {
                sessions.insert(s.id, s.clone());
            }
            Ok(())
        }
        async fn update_session_handle(&self, _id: Uuid, _h: &str) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn update_session_state(&self, _id: Uuid, _s: &serde_json::Value) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn insert_ticket(&self, _t: &crate::model::WorkTicket) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_ticket(&self, _id: Uuid) -> Result<Option<crate::model::WorkTicket>, DatabaseError> {
            unreachable!()
        }
        async fn get_ticket_by_work_request(
            &self,
            _id: Uuid,
        ) -> Result<Option<crate::model::WorkTicket>, DatabaseError> {
            unreachable!()
        }
        async fn mark_ticket_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn mark_ticket_terminal(
            &self,
            _id: Uuid,
            _status: crate::model::WorkTicketStatus,
        ) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn increment_ticket_output_count(&self, _id: Uuid) -> Result<(), DatabaseError> {
            unreachable!()
        }
    }

    /// A specialist's `parent_session_id` points to the thinking_partner
    /// session of the same basket, and that session exists.
    #[tokio::test]
    async fn specialist_session_is_parented_to_thinking_partner() {
        let registry = SessionRegistry::new(Arc::new(FakeDb::new()));
        let basket_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();

        let research = registry
            .get_or_create(basket_id, workspace_id, AgentKind::Research)
            .await
            .unwrap();

        let parent_id = research.parent_session_id.expect("specialist must have a parent");
        let parent = registry.get(parent_id).await.unwrap().expect("parent session must exist");
        assert_eq!(parent.agent_kind, AgentKind::ThinkingPartner);
        assert_eq!(parent.basket_id, basket_id);
    }

    /// Concurrent `get_or_create` calls for the same (basket, agent_kind)
    /// converge on one row.
    #[tokio::test]
    async fn get_or_create_is_idempotent_under_concurrency() {
        let registry = Arc::new(SessionRegistry::new(Arc::new(FakeDb::new())));
        let basket_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_create(basket_id, workspace_id, AgentKind::Content)
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }

        let first = ids[0];
        assert!(ids.iter().all(|id| *id == first), "all calls must return the same session id");
    }

    #[tokio::test]
    async fn thinking_partner_session_has_no_parent() {
        let registry = SessionRegistry::new(Arc::new(FakeDb::new()));
        let basket_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();

        let tp = registry
            .get_or_create(basket_id, workspace_id, AgentKind::ThinkingPartner)
            .await
            .unwrap();

        assert!(tp.parent_session_id.is_none());
    }
}
