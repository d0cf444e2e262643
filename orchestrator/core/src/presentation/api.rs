// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP façade consumed by front-ends.
//!
//! All bodies are UTF-8 JSON. Error responses use 4xx/5xx with
//! `{error, kind}` where `kind` is one of the invocation error taxonomy
//! names.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::dispatcher::Dispatcher;
use crate::application::invocation::InvocationPipeline;
use crate::domain::react::{Action, ActionStatus, Observation};
use crate::domain::tool::{ArgMap, ArgValue};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::confirmation::{BrokerError, ConfirmationBroker};
use crate::infrastructure::context_store::ContextStore;
use crate::infrastructure::coordinator::WorkerPool;

pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub pipeline: Arc<InvocationPipeline>,
    pub store: Arc<ContextStore>,
    pub broker: Arc<ConfirmationBroker>,
    pub pool: Arc<WorkerPool>,
    pub audit: Arc<AuditLog>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/command", post(command))
        .route("/context", post(reset_context))
        .route("/context/{user_id}", get(get_context))
        .route("/context/{user_id}", delete(clear_context))
        .route("/exec", post(exec))
        .route("/tools", get(tools))
        .route("/stats", get(stats))
        .route("/security/confirm/{id}", post(confirm))
        .route("/security/pending", get(pending))
        .route("/security/audit", get(audit_recent))
        .route("/security/report/{user_id}", get(security_report))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn error_body(status: StatusCode, kind: &str, message: String) -> Response {
    (status, Json(json!({ "error": message, "kind": kind }))).into_response()
}

fn kind_status(kind: &str) -> StatusCode {
    match kind {
        "ValidationError" => StatusCode::BAD_REQUEST,
        "UnknownTool" => StatusCode::NOT_FOUND,
        "PermissionDenied" | "ConfirmationRejected" => StatusCode::FORBIDDEN,
        "ConfirmationTimeout" | "Timeout" | "Cancelled" => StatusCode::REQUEST_TIMEOUT,
        "RemoteUnavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn observation_error(observation: &Observation) -> Response {
    let kind = observation.error_kind.as_deref().unwrap_or("Internal");
    let message = observation
        .error
        .clone()
        .unwrap_or_else(|| "internal error".to_string());
    error_body(kind_status(kind), kind, message)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Majordomo Orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let services = state.pool.health_all().await;
    let all_healthy = !services.is_empty() && services.values().all(|healthy| *healthy);
    Json(json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "services": services,
    }))
}

#[derive(Deserialize)]
struct CommandRequest {
    text: String,
    user_id: Option<String>,
    context: Option<serde_json::Map<String, Value>>,
}

async fn command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> Response {
    let principal = request.user_id.as_deref().unwrap_or("default");
    let cancel = CancellationToken::new();

    match state
        .dispatcher
        .dispatch(principal, &request.text, request.context.as_ref(), &cancel)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_body(StatusCode::BAD_REQUEST, e.kind(), e.to_string()),
    }
}

#[derive(Deserialize)]
struct ResetContextRequest {
    user_id: Option<String>,
}

async fn reset_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetContextRequest>,
) -> Response {
    let Some(user_id) = request.user_id.filter(|id| !id.is_empty()) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "user_id required".to_string(),
        );
    };

    state.store.clear(&user_id);
    Json(json!({
        "user_id": user_id,
        "context": {},
        "created": true,
    }))
    .into_response()
}

async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    let context = state.store.snapshot(&user_id).await;
    Json(json!({ "user_id": user_id, "context": context }))
}

async fn clear_context(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    state.store.clear(&user_id);
    Json(json!({ "message": format!("Context cleared for {}", user_id) }))
}

#[derive(Deserialize)]
struct ExecRequest {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    timeout: Option<i64>,
    cwd: Option<String>,
    user_id: Option<String>,
}

async fn exec(State(state): State<Arc<AppState>>, Json(request): Json<ExecRequest>) -> Response {
    if request.command.trim().is_empty() {
        return error_body(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "command required".to_string(),
        );
    }

    let mut command_line = request.command.clone();
    for arg in &request.args {
        command_line.push(' ');
        command_line.push_str(arg);
    }

    let mut arguments = ArgMap::new();
    arguments.insert("command".to_string(), ArgValue::from(command_line));
    if let Some(timeout) = request.timeout {
        arguments.insert("timeout".to_string(), ArgValue::from(timeout));
    }
    if let Some(cwd) = &request.cwd {
        arguments.insert("cwd".to_string(), ArgValue::from(cwd.as_str()));
    }
    let action = Action::new("run_terminal", arguments);

    let principal = request.user_id.as_deref().unwrap_or("default");
    let deadline = Instant::now() + std::time::Duration::from_secs(90);
    let observation = state
        .pipeline
        .invoke(principal, &action, deadline, &CancellationToken::new())
        .await;

    match observation.status {
        ActionStatus::Success => {
            Json(observation.result.unwrap_or(Value::Null)).into_response()
        }
        _ => observation_error(&observation),
    }
}

async fn tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    let catalog = state.pipeline.registry().describe().await;
    Json(json!({ "count": catalog.len(), "tools": catalog }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let agent = state.dispatcher.agent().stats();
    Json(json!({
        "agent": agent,
        "sessions": state.store.session_count(),
        "workers": state.pool.descriptors().await,
    }))
}

#[derive(Deserialize)]
struct ConfirmRequest {
    approved: bool,
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "invalid request id".to_string(),
        );
    };

    match state.broker.resolve(id, request.approved).await {
        Ok(outcome) => Json(json!({ "ok": true, "outcome": outcome })).into_response(),
        Err(e @ BrokerError::AlreadyResolved(_)) => {
            error_body(StatusCode::CONFLICT, "ValidationError", e.to_string())
        }
        Err(e @ BrokerError::Expired(_)) => {
            error_body(StatusCode::GONE, "ConfirmationTimeout", e.to_string())
        }
        Err(e @ BrokerError::Unknown(_)) => {
            error_body(StatusCode::NOT_FOUND, "ValidationError", e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct PendingQuery {
    user_id: Option<String>,
}

async fn pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Json<Value> {
    let requests = state.broker.pending(query.user_id.as_deref()).await;
    let map: serde_json::Map<String, Value> = requests
        .into_iter()
        .map(|r| (r.id.to_string(), serde_json::to_value(&r).unwrap_or(Value::Null)))
        .collect();
    Json(json!({ "requests": map }))
}

#[derive(Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn audit_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(100).min(1000);
    match state.audit.recent(limit) {
        Ok(entries) => Json(json!({ "entries": entries })).into_response(),
        Err(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal",
            e.to_string(),
        ),
    }
}

async fn security_report(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Response {
    match state.audit.principal_stats(&user_id) {
        Ok(stats) => Json(json!({ "user_id": user_id, "stats": stats })).into_response(),
        Err(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal",
            e.to_string(),
        ),
    }
}
