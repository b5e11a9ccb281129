//! Subscription endpoints: create and destroy.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use slookup_core::RegistryError;

use crate::subscription::SubscriptionSpec;

use super::{parse_json_body, ApiError, AppState};

/// `POST /lookup/subscribe` -- create a subscription.
///
/// Body: `{"query": {...}, "endpoint": "...", "max-push-events"?,
/// "time-interval"?}`. The id is always assigned by this cache.
pub async fn subscribe_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = parse_json_body(&body)?;
    let mut spec: SubscriptionSpec = serde_json::from_value(body)
        .map_err(|err| RegistryError::BadRequest(format!("malformed subscription: {err}")))?;
    spec.id = String::new();

    let subscription = state.ctx.subscriptions.subscribe(spec)?;
    Ok(Json(json!({ "subscription-id": subscription.id() })))
}

/// `DELETE /lookup/subscribe/{id}` -- destroy a subscription.
pub async fn unsubscribe_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.ctx.subscriptions.unsubscribe(&id) {
        Ok(Json(json!({ "subscription-id": id })))
    } else {
        Err(ApiError(RegistryError::NotFound(id)))
    }
}
