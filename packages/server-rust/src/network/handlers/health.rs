//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::network::shutdown::HealthState;

use super::AppState;

/// `GET /health` -- detailed health JSON.
///
/// Always returns 200; the `state` field says whether the server is
/// actually accepting traffic, so monitoring can tell "up but draining"
/// from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let records = state.ctx.store.count().await;
    Json(json!({
        "state": state.shutdown.state().as_str(),
        "cache": state.ctx.config.cache_name,
        "records": records,
        "leases": state.ctx.leases.active_count(),
        "subscriptions": state.ctx.subscriptions.count(),
        "archived": state.ctx.archive.count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// `GET /health/live` -- liveness probe, always 200 while the process
/// responds.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready` -- readiness probe: 200 only in the `Ready`
/// state, 503 during startup and drain.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
