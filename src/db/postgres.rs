//! PostgreSQL-backed implementation of [`Database`].

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::db::Database;
use crate::error::DatabaseError;
use crate::model::{
    AgentKind, AgentSession, Project, ProjectStatus, PromotionMode, WorkRequest,
    WorkRequestStatus, WorkTicket, WorkTicketStatus,
};

refinery::embed_migrations!("migrations");

pub struct Store {
    pool: Pool,
}

impl Store {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url.expose_secret().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut conn = self.pool.get().await?;
        let client = &mut *conn;
        migrations::runner()
            .run_async(client)
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        Ok(())
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }
}

fn row_to_project(row: &tokio_postgres::Row) -> Project {
    let status: String = row.get("status");
    let mode: String = row.get("promotion_mode");
    Project {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        basket_id: row.get("basket_id"),
        name: row.get("name"),
        description: row.get("description"),
        status: ProjectStatus::parse(&status).unwrap_or(ProjectStatus::Active),
        promotion_mode: PromotionMode::parse(&mode).unwrap_or(PromotionMode::Manual),
        auto_promote_types: serde_json::from_value(row.get("auto_promote_types")).unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

fn row_to_work_request(row: &tokio_postgres::Row) -> WorkRequest {
    let agent_kind: String = row.get("agent_kind");
    let status: String = row.get("status");
    WorkRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        workspace_id: row.get("workspace_id"),
        basket_id: row.get("basket_id"),
        agent_kind: AgentKind::parse(&agent_kind).expect("invalid agent_kind in db"),
        work_mode: row.get("work_mode"),
        payload: row.get("payload"),
        is_trial: row.get("is_trial"),
        status: WorkRequestStatus::parse(&status).unwrap_or(WorkRequestStatus::Pending),
        result_summary: row.get("result_summary"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_session(row: &tokio_postgres::Row) -> AgentSession {
    let agent_kind: String = row.get("agent_kind");
    AgentSession {
        id: row.get("id"),
        basket_id: row.get("basket_id"),
        workspace_id: row.get("workspace_id"),
        agent_kind: AgentKind::parse(&agent_kind).expect("invalid agent_kind in db"),
        parent_session_id: row.get("parent_session_id"),
        provider_session_handle: row.get("provider_session_handle"),
        state: row.get("state"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_ticket(row: &tokio_postgres::Row) -> WorkTicket {
    let agent_kind: String = row.get("agent_kind");
    let status: String = row.get("status");
    WorkTicket {
        id: row.get("id"),
        work_request_id: row.get("work_request_id"),
        agent_session_id: row.get("agent_session_id"),
        basket_id: row.get("basket_id"),
        workspace_id: row.get("workspace_id"),
        agent_kind: AgentKind::parse(&agent_kind).expect("invalid agent_kind in db"),
        status: WorkTicketStatus::parse(&status).unwrap_or(WorkTicketStatus::Pending),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        metadata: row.get("metadata"),
    }
}

use secrecy::ExposeSecret;

#[async_trait]
impl Database for Store {
    async fn ensure_workspace(&self, id: Uuid, name: &str) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO workspaces (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
            &[&id, &name],
        )
        .await?;
        Ok(())
    }

    async fn create_project(&self, project: &Project) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        let auto_promote_types = serde_json::to_value(&project.auto_promote_types)
            .unwrap_or_else(|_| serde_json::json!([]));
        conn.execute(
            r#"
            INSERT INTO projects (
                id, workspace_id, basket_id, name, description, status,
                promotion_mode, auto_promote_types, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            &[
                &project.id,
                &project.workspace_id,
                &project.basket_id,
                &project.name,
                &project.description,
                &project.status.as_str(),
                &project.promotion_mode.as_str(),
                &auto_promote_types,
                &project.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM projects WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(row_to_project))
    }

    async fn get_project_by_basket(&self, basket_id: Uuid) -> Result<Option<Project>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM projects WHERE basket_id = $1", &[&basket_id])
            .await?;
        Ok(row.as_ref().map(row_to_project))
    }

    async fn list_projects_for_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<Project>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM projects WHERE workspace_id = $1 ORDER BY created_at DESC",
                &[&workspace_id],
            )
            .await?;
        Ok(rows.iter().map(row_to_project).collect())
    }

    async fn update_project_status(
        &self,
        id: Uuid,
        status: ProjectStatus,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE projects SET status = $2 WHERE id = $1",
            &[&id, &status.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn update_project_promotion_settings(
        &self,
        id: Uuid,
        mode: PromotionMode,
        auto_promote_types: &[String],
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        let types_json =
            serde_json::to_value(auto_promote_types).unwrap_or_else(|_| serde_json::json!([]));
        conn.execute(
            "UPDATE projects SET promotion_mode = $2, auto_promote_types = $3 WHERE id = $1",
            &[&id, &mode.as_str(), &types_json],
        )
        .await?;
        Ok(())
    }

    async fn has_active_subscription(
        &self,
        user_id: &str,
        workspace_id: Uuid,
        agent_kind: AgentKind,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT 1 FROM agent_subscriptions
                WHERE user_id = $1 AND workspace_id = $2 AND agent_kind = $3 AND active
                "#,
                &[&user_id, &workspace_id, &agent_kind.as_str()],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn count_trial_work_requests(
        &self,
        user_id: &str,
        workspace_id: Uuid,
    ) -> Result<u32, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                r#"
                SELECT COUNT(*) AS cnt FROM work_requests
                WHERE user_id = $1 AND workspace_id = $2 AND is_trial
                  AND status IN ('running', 'completed')
                "#,
                &[&user_id, &workspace_id],
            )
            .await?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u32)
    }

    async fn insert_work_request(&self, req: &WorkRequest) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO work_requests (
                id, user_id, workspace_id, basket_id, agent_kind, work_mode,
                payload, is_trial, status, result_summary, error_message,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
            &[
                &req.id,
                &req.user_id,
                &req.workspace_id,
                &req.basket_id,
                &req.agent_kind.as_str(),
                &req.work_mode,
                &req.payload,
                &req.is_trial,
                &req.status.as_str(),
                &req.result_summary,
                &req.error_message,
                &req.created_at,
                &req.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_work_request(&self, id: Uuid) -> Result<Option<WorkRequest>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM work_requests WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(row_to_work_request))
    }

    async fn mark_work_request_running(&self, id: Uuid) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE work_requests SET status = 'running', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
            &[&id],
        )
        .await?;
        Ok(())
    }

    async fn mark_work_request_completed(
        &self,
        id: Uuid,
        result_summary: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE work_requests SET status = 'completed', result_summary = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
            &[&id, &result_summary],
        )
        .await?;
        Ok(())
    }

    async fn mark_work_request_failed(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE work_requests SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'failed'
            "#,
            &[&id, &error_message],
        )
        .await?;
        Ok(())
    }

    async fn get_session_by_basket_agent_kind(
        &self,
        basket_id: Uuid,
        agent_kind: AgentKind,
    ) -> Result<Option<AgentSession>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM agent_sessions WHERE basket_id = $1 AND agent_kind = $2",
                &[&basket_id, &agent_kind.as_str()],
            )
            .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<AgentSession>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM agent_sessions WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn insert_session(&self, session: &AgentSession) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO agent_sessions (
                id, basket_id, workspace_id, agent_kind, parent_session_id,
                provider_session_handle, state, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (basket_id, agent_kind) DO NOTHING
            "#,
            &[
                &session.id,
                &session.basket_id,
                &session.workspace_id,
                &session.agent_kind.as_str(),
                &session.parent_session_id,
                &session.provider_session_handle,
                &session.state,
                &session.metadata,
                &session.created_at,
                &session.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_session_handle(&self, id: Uuid, handle: &str) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE agent_sessions SET provider_session_handle = $2, updated_at = NOW() WHERE id = $1",
            &[&id, &handle],
        )
        .await?;
        Ok(())
    }

    async fn update_session_state(
        &self,
        id: Uuid,
        state: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE agent_sessions SET state = $2, updated_at = NOW() WHERE id = $1",
            &[&id, state],
        )
        .await?;
        Ok(())
    }

    async fn insert_ticket(&self, ticket: &WorkTicket) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO work_tickets (
                id, work_request_id, agent_session_id, basket_id, workspace_id,
                agent_kind, status, started_at, ended_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
            &[
                &ticket.id,
                &ticket.work_request_id,
                &ticket.agent_session_id,
                &ticket.basket_id,
                &ticket.workspace_id,
                &ticket.agent_kind.as_str(),
                &ticket.status.as_str(),
                &ticket.started_at,
                &ticket.ended_at,
                &ticket.metadata,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<WorkTicket>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM work_tickets WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(row_to_ticket))
    }

    async fn get_ticket_by_work_request(
        &self,
        work_request_id: Uuid,
    ) -> Result<Option<WorkTicket>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM work_tickets WHERE work_request_id = $1",
                &[&work_request_id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_ticket))
    }

    async fn mark_ticket_running(&self, id: Uuid) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE work_tickets SET status = 'running', started_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
            &[&id],
        )
        .await?;
        Ok(())
    }

    async fn mark_ticket_terminal(
        &self,
        id: Uuid,
        status: WorkTicketStatus,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE work_tickets SET status = $2, ended_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'pending_review', 'failed')
            "#,
            &[&id, &status.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn increment_ticket_output_count(&self, id: Uuid) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE work_tickets
            SET metadata = jsonb_set(
                metadata,
                '{output_count}',
                to_jsonb(COALESCE((metadata->>'output_count')::int, 0) + 1)
            )
            WHERE id = $1
            "#,
            &[&id],
        )
        .await?;
        Ok(())
    }

    // WorkOutput rows are not persisted here: they're owned by the
    // substrate service and routed through it exclusively (see
    // `substrate::SubstrateClient::create_work_output` and friends).
}
