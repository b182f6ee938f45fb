//! API route handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use super::auth::{AdminUser, AuthenticatedUser};
use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::types::*;
use crate::history::{RunHistory, TailChunk};
use crate::tasks::{Content, Task, TaskDeclaration};

// ============================================================================
// Health & Authentication Handlers
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version().to_string(),
        uptime_secs: state.uptime_secs(),
        accepting_runs: state.engine.pool().is_running(),
    })
}

/// Login and get JWT token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let roles = state
        .verify_credentials(&req.username, &req.password)
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let token = state
        .jwt_auth
        .generate_token(&req.username, roles)
        .map_err(|e| ApiError::Internal(format!("Failed to generate token: {}", e)))?;

    info!("User '{}' logged in successfully", req.username);

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_auth.expiration_secs(),
    }))
}

// ============================================================================
// Task Handlers
// ============================================================================

fn find_task(state: &AppState, id: &str) -> ApiResult<Task> {
    let task = state.engine.store().resolve_task(id)?;
    if task.is_deleted {
        return Err(ApiError::NotFound(format!("Task '{}' not found", id)));
    }
    Ok(task)
}

/// Queue a run of a task.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<RunQueuedResponse>> {
    let task = find_task(&state, &id)?;
    let handle = state
        .engine
        .submit(task.id)
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    info!(task = %task.name, user = %user.claims.sub, %handle, "Run requested");
    Ok(Json(RunQueuedResponse {
        task: handle,
        task_id: task.id,
    }))
}

/// Status of a queued run.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(handle): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    let status = state
        .engine
        .pool()
        .status(handle)
        .ok_or_else(|| ApiError::NotFound(format!("Job '{}' not found", handle)))?;
    Ok(Json(JobResponse { handle, status }))
}

/// List live tasks.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Json<Vec<TaskSummary>> {
    let store = state.engine.store();
    let summaries = store
        .tasks()
        .into_iter()
        .map(|task| TaskSummary {
            latest_version: store.latest_content(task.id).map(|c| c.version),
            history: store.history_summary(task.id),
            last_run: store.latest_history(task.id).map(|h| h.date_start),
            task,
        })
        .collect();
    Json(summaries)
}

/// Declare a task.
pub async fn declare_task(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(mut declaration): Json<TaskDeclaration>,
) -> ApiResult<Json<DeclareResponse>> {
    if declaration.created_by.is_none() {
        declaration.created_by = Some(user.claims.sub.clone());
    }
    let (task, created) = state.engine.declare(&declaration)?;
    Ok(Json(DeclareResponse { task, created }))
}

/// A task with its newest content.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskDetail>> {
    let task = find_task(&state, &id)?;
    let store = state.engine.store();
    let content = store.latest_content(task.id);
    let total_assets = content
        .as_ref()
        .map(|c| c.total_assets(state.engine.directory().as_ref()).len())
        .unwrap_or(0);

    Ok(Json(TaskDetail {
        history: store.history_summary(task.id),
        task,
        content,
        total_assets,
    }))
}

/// Every content version, newest first.
pub async fn list_contents(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Content>>> {
    let task = find_task(&state, &id)?;
    Ok(Json(state.engine.store().contents(task.id)))
}

/// Run histories, newest first.
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RunHistory>>> {
    let task = state.engine.store().resolve_task(&id)?;
    Ok(Json(state.engine.store().histories(task.id)))
}

/// Delete a task; `?hard=true` drops its history too.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<Task>> {
    let task = state.engine.store().resolve_task(&id)?;
    let task = state.engine.delete_task(task.id, query.hard)?;
    info!(task = %task.name, hard = query.hard, user = %admin.claims.sub, "Task deleted");
    Ok(Json(task))
}

// ============================================================================
// History Handlers
// ============================================================================

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunHistory>> {
    state
        .engine
        .store()
        .history(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run history '{}' not found", id)))
}

/// Next chunk of a run's log.
pub async fn tail_log(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<TailChunk>> {
    let chunk = state.engine.tail(id, query.mark.as_deref()).await?;
    Ok(Json(chunk))
}

// ============================================================================
// Schedule Handlers
// ============================================================================

pub async fn list_schedule(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Json<Vec<ScheduleEntry>> {
    let registry = state.engine.registry();
    let entries = registry
        .entries()
        .into_iter()
        .map(|(name, entry)| ScheduleEntry {
            last_fired: registry.last_fired(&name),
            name,
            entry,
        })
        .collect();
    Json(entries)
}
