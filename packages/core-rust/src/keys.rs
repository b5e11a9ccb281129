//! Reserved wire keys of the lookup protocol.
//!
//! Keys under the `record-` prefix are semantically meaningful to the
//! service; every other key in a record is opaque payload. The constants
//! here are the exact string forms that appear in JSON bodies and query
//! strings.

/// Prefix shared by all reserved keys.
pub const RESERVED_PREFIX: &str = "record-";

/// Record identity, assigned by the registration service.
pub const RECORD_URI: &str = "record-uri";

/// Requested time-to-live, an ISO-8601 duration (`PT1H`).
pub const RECORD_TTL: &str = "record-ttl";

/// Absolute expiry timestamp, RFC 3339 UTC. Computed, never client-supplied.
pub const RECORD_EXPIRES: &str = "record-expires";

/// Alias for the record type accepted on input and normalized to [`RECORD_TYPE`].
pub const RECORD_TYPE_ALIAS: &str = "record-type";

/// Lifecycle state (`REGISTER`, `RENEW`, `DELETE`, `EXPIRED`).
pub const RECORD_STATE: &str = "record-state";

/// Query control: clause combinator, `all` or `any`.
pub const RECORD_OPERATOR: &str = "record-operator";

/// Query control: number of leading matches to drop.
pub const RECORD_SKIP: &str = "record-skip";

/// Query control: result cap, `0` = unlimited.
pub const RECORD_MAX_RESULTS: &str = "record-max-results";

/// Optional access token authorizing renew/delete of the record.
pub const CLIENT_UUID: &str = "client-uuid";

/// Required payload attribute classifying the record (host, interface, ...).
///
/// The scenarios in the protocol use the bare `type` key; [`RECORD_TYPE_ALIAS`]
/// is accepted on input for compatibility.
pub const RECORD_TYPE: &str = "type";

/// Returns `true` if `key` is one of the three query controls.
///
/// Reserved-prefixed keys that are *not* controls remain ordinary match
/// clauses so that newer peers can query on attributes this cache does not
/// yet understand.
#[must_use]
pub fn is_query_control(key: &str) -> bool {
    matches!(key, RECORD_OPERATOR | RECORD_SKIP | RECORD_MAX_RESULTS)
}
