//! REST control surface over the character fleet.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::error::JobError;
use crate::worker::objective::{ObjectiveKind, Target};
use crate::worker::scheduler::{CharacterHandle, Fleet};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<Fleet>,
}

/// Build the Axum router for the control endpoints.
pub fn control_routes(fleet: Arc<Fleet>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/characters", get(list_characters))
        .route("/api/characters/{name}/jobs", get(list_jobs).post(append_job))
        .route("/api/characters/{name}/jobs/cancelled", get(cancelled_jobs))
        .route("/api/characters/{name}/jobs/{id}", get(get_job))
        .route("/api/characters/{name}/jobs/{id}/chain", get(job_chain))
        .route("/api/characters/{name}/jobs/{id}/cancel", post(cancel_job))
        .route("/api/characters/{name}/pause", post(pause))
        .route("/api/characters/{name}/resume", post(resume))
        .route("/api/characters/{name}/save", post(save))
        .layer(cors)
        .with_state(AppState { fleet })
}

fn error_response(err: JobError) -> Response {
    let status = match err {
        JobError::NotFound { .. } | JobError::UnknownCharacter { .. } => StatusCode::NOT_FOUND,
        JobError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
        JobError::InvalidTransition { .. } => StatusCode::CONFLICT,
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

async fn character(state: &AppState, name: &str) -> Result<CharacterHandle, Response> {
    state.fleet.handle(name).await.map_err(error_response)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "artifacts-runner"
    }))
}

async fn list_characters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.fleet.characters().await)
}

// ── Jobs ────────────────────────────────────────────────────────────────

async fn list_jobs(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let handle = match character(&state, &name).await {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    Json(serde_json::json!({
        "jobs": handle.list_objectives_with_parents().await,
        "active": handle.active_chain().await,
        "executing": handle.executing_job().await,
        "paused": handle.is_paused(),
    }))
    .into_response()
}

#[derive(Deserialize)]
struct AppendRequest {
    kind: ObjectiveKind,
    target: Target,
}

async fn append_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<AppendRequest>,
) -> Response {
    let handle = match character(&state, &name).await {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.append_job(body.kind, body.target).await {
        Ok(record) => (StatusCode::CREATED, Json(serde_json::json!(record))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_job(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Response {
    let handle = match character(&state, &name).await {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.get_job(&id).await {
        Ok(record) => Json(serde_json::json!(record)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn job_chain(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Response {
    let handle = match character(&state, &name).await {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.get_job_chain(&id).await {
        Ok(chain) => Json(serde_json::json!({"root": id, "chain": chain})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn cancel_job(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Response {
    let handle = match character(&state, &name).await {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.cancel_job_and_children(&id).await {
        Ok(cancelled) => {
            Json(serde_json::json!({"status": "cancelled", "cancelled": cancelled})).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn cancelled_jobs(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match character(&state, &name).await {
        Ok(handle) => Json(handle.get_cancelled_jobs().await).into_response(),
        Err(resp) => resp,
    }
}

// ── Control ─────────────────────────────────────────────────────────────

async fn pause(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match character(&state, &name).await {
        Ok(handle) => {
            handle.pause_job();
            Json(serde_json::json!({"status": "paused"})).into_response()
        }
        Err(resp) => resp,
    }
}

async fn resume(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match character(&state, &name).await {
        Ok(handle) => {
            handle.resume_job();
            Json(serde_json::json!({"status": "running"})).into_response()
        }
        Err(resp) => resp,
    }
}

async fn save(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let handle = match character(&state, &name).await {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    match handle.save_job_queue().await {
        Ok(()) => Json(serde_json::json!({"status": "saved"})).into_response(),
        Err(e) => {
            tracing::error!(character = %name, error = %e, "Manual save failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
