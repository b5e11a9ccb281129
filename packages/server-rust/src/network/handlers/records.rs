//! Record endpoints: register, query, fetch, renew, delete.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::Json;
use slookup_core::Record;

use crate::service::{EditService, QueryService, RegistrationService};

use super::{parse_json_body, ApiError, AppState};

/// `POST /lookup/records` -- register a record.
pub async fn register_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Record>, ApiError> {
    let body = parse_json_body(&body)?;
    let stored = RegistrationService::register(&state.ctx, body).await?;
    Ok(Json(stored))
}

/// `GET /lookup/records?...` -- query the live namespace.
pub async fn query_live_handler(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Vec<Record>>, ApiError> {
    let results = QueryService::search_live(&state.ctx, raw.as_deref()).await?;
    Ok(Json(results))
}

/// `GET /lookup/records/{id}` -- fetch one record by URI.
pub async fn get_record_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let uri = state.ctx.config.record_uri(&id);
    let record = QueryService::get(&state.ctx, &uri).await?;
    Ok(Json(record))
}

/// `POST /lookup/records/{id}` -- renew.
pub async fn renew_record_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Record>, ApiError> {
    let uri = state.ctx.config.record_uri(&id);
    // An empty body is a plain renewal keeping the stored TTL.
    let delta = if body.is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        parse_json_body(&body)?
    };
    let renewed = EditService::renew(&state.ctx, &uri, delta).await?;
    Ok(Json(renewed))
}

/// `DELETE /lookup/records/{id}` -- delete, with an optional auth body.
pub async fn delete_record_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Record>, ApiError> {
    let uri = state.ctx.config.record_uri(&id);
    let auth_body = if body.is_empty() {
        None
    } else {
        Some(parse_json_body(&body)?)
    };
    let tombstone = EditService::delete(&state.ctx, &uri, auth_body).await?;
    Ok(Json(tombstone))
}
