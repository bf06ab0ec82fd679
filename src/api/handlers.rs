use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, ReadyResponse, RootResponse, WorkerMetrics};

pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Gradeflow API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    match sqlx::query("SELECT 1").execute(state.db()).await {
        Ok(_) => {
            components.insert("database".to_string(), "healthy".to_string());
        }
        Err(err) => {
            components.insert("database".to_string(), format!("unhealthy: {err}"));
            status = "unhealthy".to_string();
        }
    }

    components.insert(
        "storage".to_string(),
        if state.storage().is_some() { "configured" } else { "absent" }.to_string(),
    );

    Json(HealthResponse { status, role: state.role().to_string(), components })
}

pub(crate) async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let database_ready = sqlx::query("SELECT 1").execute(state.db()).await.is_ok();

    let worker_loop_enabled = state.worker_runtime().is_some();
    let (worker_loop_ready, worker_metrics) = match state.worker_runtime() {
        Some(runtime) => {
            let snapshot = runtime.snapshot();
            (
                snapshot.started && !snapshot.stopped,
                WorkerMetrics {
                    started: snapshot.started,
                    stopped: snapshot.stopped,
                    ticks_total: snapshot.ticks_total,
                    claims_total: snapshot.claims_total,
                    idle_ticks_total: snapshot.idle_ticks_total,
                    errors_total: snapshot.errors_total,
                },
            )
        }
        None => (true, WorkerMetrics::default()),
    };

    let ready = database_ready && worker_loop_ready;
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            role: state.role().to_string(),
            worker_loop_enabled,
            worker_loop_ready,
            worker_metrics,
        }),
    )
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
