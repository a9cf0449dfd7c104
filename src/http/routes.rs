//! Route handlers for the HTTP surface.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::model::PromotionMethod;
use crate::scaffold::ScaffoldRequest;
use crate::substrate::AuthOverride;
use crate::substrate::types::ListWorkOutputsFilter;
use crate::ticket::AdmitRequest;

use super::dto::*;
use super::AppState;

fn auth_override(user: &AuthUser) -> AuthOverride {
    AuthOverride {
        user_token: Some(user.token.clone()),
    }
}

pub async fn scaffold_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ScaffoldBody>,
) -> Result<Response, Response> {
    let result = state
        .scaffolder
        .scaffold(ScaffoldRequest {
            user_id: user.user_id,
            workspace_id: body.workspace_id,
            name: body.name,
            description: body.description,
            initial_context_text: body.initial_context_text,
        })
        .await
        .map_err(|e| e.into_response())?;

    Ok((StatusCode::CREATED, Json(result)).into_response())
}

/// Deprecated direct-admission path: admits, executes, and fetches the
/// emitted outputs synchronously, returning the terminal ticket state.
pub async fn run_agent(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<RunAgentBody>,
) -> Result<Response, AppError> {
    let admission = state
        .executor
        .admit(AdmitRequest {
            user_id: user.user_id.clone(),
            workspace_id: body.workspace_id,
            basket_id: body.basket_id,
            agent_kind: body.agent_kind,
            work_mode: body.work_mode,
            payload: body.payload,
        })
        .await?;

    let auth = auth_override(&user);
    let status = state.executor.execute(admission.ticket_id, auth.clone()).await?;

    let outputs = state
        .substrate
        .list_work_outputs(
            &auth,
            body.basket_id,
            &ListWorkOutputsFilter {
                work_ticket_id: Some(admission.ticket_id),
                ..Default::default()
            },
        )
        .await
        .unwrap_or_default();

    let response = RunAgentResponse {
        work_request_id: admission.work_request_id,
        work_ticket_id: admission.ticket_id,
        is_trial_request: admission.is_trial,
        remaining_trials: admission.remaining_trials,
        status: status.as_str().to_string(),
        response_text: None,
        outputs: outputs.into_iter().map(WorkOutputSummary::from).collect(),
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Admits a recipe-based ticket and executes it in the background. This
/// endpoint may be called service-to-service.
pub async fn queue_work(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<QueueWorkBody>,
) -> Result<Response, AppError> {
    let admission = state
        .executor
        .admit(AdmitRequest {
            user_id: user.user_id.clone(),
            workspace_id: body.workspace_id,
            basket_id: body.basket_id,
            agent_kind: body.agent_kind,
            work_mode: body.work_mode,
            payload: body.payload,
        })
        .await?;

    let auth = auth_override(&user);
    let executor = Arc::clone(&state.executor);
    let ticket_id = admission.ticket_id;
    tokio::spawn(async move {
        if let Err(err) = executor.execute(ticket_id, auth).await {
            tracing::error!(ticket_id = %ticket_id, error = %err, "queued ticket execution failed");
        }
    });

    let response = QueueWorkResponse {
        work_request_id: admission.work_request_id,
        work_ticket_id: admission.ticket_id,
        is_trial_request: admission.is_trial,
        remaining_trials: admission.remaining_trials,
    };

    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

pub async fn stream_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket = state
        .db
        .get_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("work ticket {ticket_id}")))?;

    Ok(state
        .progress
        .stream(ticket_id, ticket.status.is_terminal())
        .into_response())
}

pub async fn list_outputs(
    State(state): State<AppState>,
    Path(basket_id): Path<Uuid>,
    user: AuthUser,
    Query(query): Query<ListOutputsQuery>,
) -> Result<Response, AppError> {
    let filter = ListWorkOutputsFilter {
        work_ticket_id: query.work_ticket_id,
        supervision_status: query.supervision_status,
        agent_kind: query.agent_kind,
        output_type: query.output_type,
    };

    let outputs = state
        .supervision
        .list_outputs(&auth_override(&user), basket_id, &filter)
        .await?;

    Ok(Json(outputs).into_response())
}

pub async fn approve_output(
    State(state): State<AppState>,
    Path((_basket_id, output_id)): Path<(Uuid, Uuid)>,
    user: AuthUser,
    Json(body): Json<ApproveBody>,
) -> Result<Response, AppError> {
    let outcome = state
        .supervision
        .approve(&auth_override(&user), output_id, &user.user_id, body.reviewer_notes)
        .await?;

    Ok(Json(json!({
        "output": outcome.output,
        "auto_promoted": outcome.auto_promoted,
    }))
    .into_response())
}

pub async fn reject_output(
    State(state): State<AppState>,
    Path((_basket_id, output_id)): Path<(Uuid, Uuid)>,
    user: AuthUser,
    Json(body): Json<RejectBody>,
) -> Result<Response, AppError> {
    let output = state
        .supervision
        .reject(&auth_override(&user), output_id, body.reviewer_notes)
        .await?;
    Ok(Json(output).into_response())
}

pub async fn promote_output(
    State(state): State<AppState>,
    Path((_basket_id, output_id)): Path<(Uuid, Uuid)>,
    user: AuthUser,
    Json(body): Json<PromoteBody>,
) -> Result<Response, AppError> {
    let method = match body.method.as_deref() {
        Some("auto") => PromotionMethod::Auto,
        _ => PromotionMethod::Manual,
    };
    let output = state
        .supervision
        .promote(&auth_override(&user), output_id, &user.user_id, method)
        .await?;
    Ok(Json(output).into_response())
}

pub async fn skip_promotion(
    State(state): State<AppState>,
    Path((_basket_id, output_id)): Path<(Uuid, Uuid)>,
    user: AuthUser,
    Json(body): Json<SkipPromotionBody>,
) -> Result<Response, AppError> {
    let output = state
        .supervision
        .skip_promotion(&auth_override(&user), output_id, &user.user_id, body.reason)
        .await?;
    Ok(Json(output).into_response())
}

/// Thinking-partner turn: admits and synchronously executes a
/// thinking_partner ticket, returning its reply text and any outputs.
pub async fn tp_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<TpChatBody>,
) -> Result<Response, AppError> {
    let mut payload = body.parameters;
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("message".to_string(), json!(body.message));
    } else {
        payload = json!({"message": body.message});
    }

    let admission = state
        .executor
        .admit(AdmitRequest {
            user_id: user.user_id.clone(),
            workspace_id: body.workspace_id,
            basket_id: body.basket_id,
            agent_kind: crate::model::AgentKind::ThinkingPartner,
            work_mode: "chat_turn".to_string(),
            payload,
        })
        .await?;

    let auth = auth_override(&user);
    let status = state.executor.execute(admission.ticket_id, auth.clone()).await?;

    let outputs = state
        .substrate
        .list_work_outputs(
            &auth,
            body.basket_id,
            &ListWorkOutputsFilter {
                work_ticket_id: Some(admission.ticket_id),
                ..Default::default()
            },
        )
        .await
        .unwrap_or_default();

    let work_request = state.db.get_work_request(admission.work_request_id).await?;

    let response = RunAgentResponse {
        work_request_id: admission.work_request_id,
        work_ticket_id: admission.ticket_id,
        is_trial_request: admission.is_trial,
        remaining_trials: admission.remaining_trials,
        status: status.as_str().to_string(),
        response_text: work_request.and_then(|r| r.result_summary),
        outputs: outputs.into_iter().map(WorkOutputSummary::from).collect(),
    };

    Ok(Json(response).into_response())
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn health_db(State(state): State<AppState>) -> Response {
    match state.store.pool().get().await {
        Ok(_) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "db health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unavailable"}))).into_response()
        }
    }
}

/// Liveness-only stub: the progress channel and executor have no external
/// queue to report depth for, so this simply confirms the process is alive
/// and accepting work.
pub async fn health_queue() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}
