//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::lifecycle::HealthState;

/// Detailed health as JSON. Always 200; `state` tells whether the server is
/// actually serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let metadata = state.odata.handler().metadata();
    Json(json!({
        "state": state.lifecycle.state(),
        "state_age_secs": state.lifecycle.state_age().as_secs(),
        "in_flight": state.lifecycle.in_flight(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "metadata_cache": metadata.stats(),
    }))
}

/// Liveness only proves the process answers; it never looks at state.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 while `Ready`, 503 while starting, draining or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.lifecycle.state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
