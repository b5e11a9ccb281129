//! Client-facing error taxonomy.
//!
//! Every operation surfaces one of these kinds; the server crate maps them
//! onto HTTP statuses. Internal failures carry an opaque message only --
//! details are logged at the failure site, never echoed to clients.

use thiserror::Error;

use crate::query::QueryParseError;
use crate::record::RecordError;
use crate::ttl::TtlError;

/// Error kinds surfaced to clients of the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Malformed input: bad JSON shape, unknown operator, bad controls.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Access token mismatch, or lease denial on renew.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown URI on get/renew/delete.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write attempted against a read-only namespace.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Store failure or post-validation invariant breach. Opaque.
    #[error("internal error")]
    Internal(String),

    /// Lease capacity exhausted.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// Short machine-readable tag for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotSupported(_) => "NOT_SUPPORTED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Message safe to echo to clients.
    ///
    /// Internal errors keep their detail out of the response body.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RecordError> for RegistryError {
    fn from(err: RecordError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<QueryParseError> for RegistryError {
    fn from(err: QueryParseError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<TtlError> for RegistryError {
    fn from(err: TtlError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
