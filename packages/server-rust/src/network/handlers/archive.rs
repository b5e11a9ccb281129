//! Archive namespace: read-only queries over historical records.

use axum::extract::{RawQuery, State};
use axum::Json;
use slookup_core::{Record, RegistryError};

use crate::service::QueryService;

use super::{ApiError, AppState};

/// `GET /lookup/services/archive?...` -- query the archive namespace.
pub async fn archive_query_handler(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Vec<Record>>, ApiError> {
    let results = QueryService::search_archive(&state.ctx, raw.as_deref())?;
    Ok(Json(results))
}

/// Any write to the archive namespace.
pub async fn archive_not_supported_handler() -> ApiError {
    ApiError(RegistryError::NotSupported(
        "the archive namespace is read-only".to_string(),
    ))
}
