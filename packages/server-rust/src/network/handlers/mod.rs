//! HTTP handlers and their shared state.

pub mod archive;
pub mod health;
pub mod records;
pub mod subscribe;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use slookup_core::RegistryError;

use crate::service::context::AppContext;

use super::shutdown::ShutdownController;

pub use archive::{archive_not_supported_handler, archive_query_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use records::{
    delete_record_handler, get_record_handler, query_live_handler, register_handler,
    renew_record_handler,
};
pub use subscribe::{subscribe_handler, unsubscribe_handler};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The application context (stores, leases, subscriptions, ...).
    pub ctx: Arc<AppContext>,
    /// Shutdown and health reporting.
    pub shutdown: Arc<ShutdownController>,
    /// Server start time, for uptime reporting.
    pub start_time: Instant,
}

/// HTTP projection of [`RegistryError`].
///
/// Internal errors are logged where they happen and cross the wire as an
/// opaque message only.
#[derive(Debug)]
pub struct ApiError(pub RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RegistryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::NotSupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.public_message(),
        }));
        (status, body).into_response()
    }
}

/// Parses a request body as JSON, mapping syntax errors to `BAD_REQUEST`.
pub(crate) fn parse_json_body(body: &axum::body::Bytes) -> Result<serde_json::Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError(RegistryError::BadRequest(format!("malformed JSON: {err}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        let cases = [
            (RegistryError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (RegistryError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (RegistryError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                RegistryError::NotSupported("x".into()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                RegistryError::Internal("secret detail".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RegistryError::Unavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn body_parse_errors_are_bad_request() {
        let bad = axum::body::Bytes::from_static(b"{not json");
        let err = parse_json_body(&bad).unwrap_err();
        assert_eq!(err.0.kind(), "BAD_REQUEST");

        let good = axum::body::Bytes::from_static(b"{\"a\": 1}");
        assert!(parse_json_body(&good).is_ok());
    }
}
