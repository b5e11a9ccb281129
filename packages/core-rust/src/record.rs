//! Record types for the lookup protocol.
//!
//! A [`Record`] is a free-form mapping from string keys to [`RecordValue`]s.
//! Reserved keys (see [`crate::keys`]) carry identity, TTL, expiry, state,
//! and the access token; everything else is opaque payload owned by the
//! publishing endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys;
use crate::ttl::{self, TtlError};

/// A single record attribute value.
///
/// The wire model permits exactly four shapes: string, number, boolean,
/// and ordered list of strings. Anything else (objects, nested or mixed
/// arrays) is unrepresentable and rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    /// Boolean attribute.
    Bool(bool),
    /// Numeric attribute (integer or float, as found in the JSON).
    Number(serde_json::Number),
    /// Single string attribute.
    Text(String),
    /// Ordered list of strings.
    List(Vec<String>),
}

impl RecordValue {
    /// Canonical string forms of this value, for clause matching.
    ///
    /// Singletons broaden to a one-element set; numbers and booleans
    /// match through their canonical string rendering.
    #[must_use]
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            Self::Bool(b) => vec![b.to_string()],
            Self::Number(n) => vec![n.to_string()],
            Self::Text(s) => vec![s.clone()],
            Self::List(items) => items.clone(),
        }
    }

    /// The scalar string form of this value.
    ///
    /// Lists collapse to their first element -- the wire sometimes wraps
    /// scalar attributes (TTL, tokens) in a single-element list.
    #[must_use]
    pub fn as_scalar_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(items) => items.first().map(String::as_str),
            Self::Bool(_) | Self::Number(_) => None,
        }
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for RecordValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Lifecycle state of a record.
///
/// State machine: `Register` -> (`Renew`)* -> `Delete` | `Expired`.
/// Terminal states only ever appear on fan-out events and in the archive;
/// the live store holds `Register`/`Renew` records exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    /// Freshly admitted by the registration service.
    #[serde(rename = "REGISTER")]
    Register,
    /// Lease renewed at least once since registration.
    #[serde(rename = "RENEW")]
    Renew,
    /// Explicitly deleted by its publisher.
    #[serde(rename = "DELETE")]
    Delete,
    /// TTL ran out without renewal.
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl RecordState {
    /// Wire string for this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "REGISTER",
            Self::Renew => "RENEW",
            Self::Delete => "DELETE",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parses a wire string, `None` for unknown values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REGISTER" => Some(Self::Register),
            "RENEW" => Some(Self::Renew),
            "DELETE" => Some(Self::Delete),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether a record in this state belongs in the live store.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Register | Self::Renew)
    }
}

/// Errors converting client JSON into a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The body was not a JSON object.
    #[error("record body must be a JSON object")]
    NotAnObject,
    /// A value used a shape outside the wire model.
    #[error("value for key `{key}` must be a string, number, boolean, or list of strings")]
    Unrepresentable {
        /// The offending key.
        key: String,
    },
}

/// One registered document, identified by its URI once admitted.
///
/// Serializes transparently as the underlying JSON object. `BTreeMap`
/// keeps serialization deterministic, which in turn keeps query results
/// and archive snapshots byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    entries: BTreeMap<String, RecordValue>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a parsed JSON value into a record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the value is not an object or any entry
    /// uses an unrepresentable shape (nested object, mixed array, ...).
    pub fn from_json(value: serde_json::Value) -> Result<Self, RecordError> {
        let serde_json::Value::Object(object) = value else {
            return Err(RecordError::NotAnObject);
        };

        let mut entries = BTreeMap::new();
        for (key, value) in object {
            let converted = match value {
                serde_json::Value::Bool(b) => RecordValue::Bool(b),
                serde_json::Value::Number(n) => RecordValue::Number(n),
                serde_json::Value::String(s) => RecordValue::Text(s),
                serde_json::Value::Array(items) => {
                    let mut strings = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            serde_json::Value::String(s) => strings.push(s),
                            _ => return Err(RecordError::Unrepresentable { key }),
                        }
                    }
                    RecordValue::List(strings)
                }
                serde_json::Value::Null | serde_json::Value::Object(_) => {
                    return Err(RecordError::Unrepresentable { key })
                }
            };
            entries.insert(key, converted);
        }
        Ok(Self { entries })
    }

    /// Looks up an attribute by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.entries.get(key)
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<RecordValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<RecordValue> {
        self.entries.remove(key)
    }

    /// Iterates all `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordValue)> {
        self.entries.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // --- Reserved attribute accessors ---

    /// The record's URI, if already assigned.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.get(keys::RECORD_URI).and_then(RecordValue::as_scalar_str)
    }

    /// Stamps the record's URI.
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.set(keys::RECORD_URI, uri.into());
    }

    /// The record's classifying type (`host`, `interface`, `service`, ...).
    #[must_use]
    pub fn record_type(&self) -> Option<&str> {
        self.get(keys::RECORD_TYPE).and_then(RecordValue::as_scalar_str)
    }

    /// The record's lifecycle state, if stamped and recognizable.
    #[must_use]
    pub fn state(&self) -> Option<RecordState> {
        self.get(keys::RECORD_STATE)
            .and_then(RecordValue::as_scalar_str)
            .and_then(RecordState::parse)
    }

    /// Stamps the lifecycle state.
    pub fn set_state(&mut self, state: RecordState) {
        self.set(keys::RECORD_STATE, state.as_str());
    }

    /// The requested TTL, parsed from its ISO-8601 wire form.
    ///
    /// # Errors
    ///
    /// Returns [`TtlError`] if a TTL is present but unparseable. A missing
    /// TTL is `Ok(None)`; callers substitute the configured default.
    pub fn ttl(&self) -> Result<Option<Duration>, TtlError> {
        match self.get(keys::RECORD_TTL) {
            None => Ok(None),
            Some(value) => {
                let text = value
                    .as_scalar_str()
                    .ok_or_else(|| TtlError::Malformed(String::new()))?;
                ttl::parse_duration(text).map(Some)
            }
        }
    }

    /// Stamps the TTL in canonical wire form.
    pub fn set_ttl(&mut self, duration: Duration) {
        self.set(keys::RECORD_TTL, ttl::format_duration(duration));
    }

    /// Absolute expiry in milliseconds since the Unix epoch.
    #[must_use]
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.get(keys::RECORD_EXPIRES)
            .and_then(RecordValue::as_scalar_str)
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|dt| dt.timestamp_millis())
    }

    /// Stamps the absolute expiry, rendered as RFC 3339 UTC.
    pub fn set_expires_at_ms(&mut self, expires_ms: i64) {
        if let Some(dt) = Utc.timestamp_millis_opt(expires_ms).single() {
            self.set(
                keys::RECORD_EXPIRES,
                dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }
    }

    /// The optional client access token.
    #[must_use]
    pub fn client_uuid(&self) -> Option<&str> {
        self.get(keys::CLIENT_UUID).and_then(RecordValue::as_scalar_str)
    }

    /// Folds the `record-type` input alias into the canonical `type` key.
    pub fn normalize_type_alias(&mut self) {
        if !self.entries.contains_key(keys::RECORD_TYPE) {
            if let Some(value) = self.entries.remove(keys::RECORD_TYPE_ALIAS) {
                self.entries.insert(keys::RECORD_TYPE.to_string(), value);
            }
        }
    }

    /// Whether the record carries at least one identifying payload key
    /// beyond `type` and the reserved namespace.
    #[must_use]
    pub fn has_identifying_payload(&self) -> bool {
        self.entries.keys().any(|key| {
            key != keys::RECORD_TYPE
                && key != keys::CLIENT_UUID
                && !key.starts_with(keys::RESERVED_PREFIX)
        })
    }
}

impl FromIterator<(String, RecordValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, RecordValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn service_record() -> Record {
        Record::from_json(json!({
            "type": ["service"],
            "service-name": ["alpha"],
            "record-ttl": ["PT1H"],
        }))
        .unwrap()
    }

    #[test]
    fn from_json_accepts_all_wire_shapes() {
        let record = Record::from_json(json!({
            "a": "text",
            "b": 42,
            "c": 1.5,
            "d": true,
            "e": ["x", "y"],
        }))
        .unwrap();
        assert_eq!(record.get("a"), Some(&RecordValue::Text("text".into())));
        assert_eq!(record.get("d"), Some(&RecordValue::Bool(true)));
        assert_eq!(
            record.get("e"),
            Some(&RecordValue::List(vec!["x".into(), "y".into()]))
        );
    }

    #[test]
    fn from_json_rejects_non_objects_and_nested_shapes() {
        assert_eq!(
            Record::from_json(json!(["not", "an", "object"])),
            Err(RecordError::NotAnObject)
        );
        assert_eq!(
            Record::from_json(json!({"bad": {"nested": true}})),
            Err(RecordError::Unrepresentable { key: "bad".into() })
        );
        assert_eq!(
            Record::from_json(json!({"bad": [1, 2]})),
            Err(RecordError::Unrepresentable { key: "bad".into() })
        );
        assert_eq!(
            Record::from_json(json!({"bad": null})),
            Err(RecordError::Unrepresentable { key: "bad".into() })
        );
    }

    #[test]
    fn ttl_accepts_string_or_singleton_list() {
        let as_list = service_record();
        assert_eq!(
            as_list.ttl().unwrap(),
            Some(Duration::from_secs(3_600))
        );

        let mut as_text = Record::new();
        as_text.set(keys::RECORD_TTL, "PT2H");
        assert_eq!(as_text.ttl().unwrap(), Some(Duration::from_secs(7_200)));

        assert_eq!(Record::new().ttl().unwrap(), None);
    }

    #[test]
    fn ttl_parse_failure_surfaces() {
        let mut record = Record::new();
        record.set(keys::RECORD_TTL, "one hour");
        assert!(record.ttl().is_err());
    }

    #[test]
    fn expires_round_trips_through_rfc3339() {
        let mut record = Record::new();
        let expires = 1_700_000_000_123_i64;
        record.set_expires_at_ms(expires);
        assert_eq!(record.expires_at_ms(), Some(expires));

        let wire = record
            .get(keys::RECORD_EXPIRES)
            .and_then(RecordValue::as_scalar_str)
            .unwrap();
        assert!(wire.ends_with('Z'), "expiry must be UTC: {wire}");
    }

    #[test]
    fn state_round_trips() {
        let mut record = service_record();
        assert_eq!(record.state(), None);
        record.set_state(RecordState::Register);
        assert_eq!(record.state(), Some(RecordState::Register));
        assert!(record.state().unwrap().is_live());

        record.set_state(RecordState::Expired);
        assert!(!record.state().unwrap().is_live());
    }

    #[test]
    fn type_alias_normalizes_without_clobbering() {
        let mut aliased = Record::from_json(json!({
            "record-type": ["host"],
            "host-name": ["h1"],
        }))
        .unwrap();
        aliased.normalize_type_alias();
        assert_eq!(aliased.record_type(), Some("host"));
        assert!(aliased.get(keys::RECORD_TYPE_ALIAS).is_none());

        let mut both = Record::from_json(json!({
            "type": ["host"],
            "record-type": ["interface"],
        }))
        .unwrap();
        both.normalize_type_alias();
        // Canonical key wins when both are present.
        assert_eq!(both.record_type(), Some("host"));
    }

    #[test]
    fn identifying_payload_excludes_reserved_and_type() {
        let mut record = Record::new();
        record.set(keys::RECORD_TYPE, vec!["service".to_string()]);
        record.set(keys::RECORD_TTL, "PT1H");
        record.set(keys::CLIENT_UUID, "token");
        assert!(!record.has_identifying_payload());

        record.set("service-name", vec!["alpha".to_string()]);
        assert!(record.has_identifying_payload());
    }

    #[test]
    fn serialization_is_transparent_and_deterministic() {
        let record = service_record();
        let text = serde_json::to_string(&record).unwrap();
        let reparsed: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, record);
        // BTreeMap ordering: keys appear sorted.
        assert!(text.find("record-ttl").unwrap() < text.find("service-name").unwrap());
    }

    #[test]
    fn value_string_broadening() {
        assert_eq!(RecordValue::Text("a".into()).as_strings(), vec!["a"]);
        assert_eq!(RecordValue::Bool(true).as_strings(), vec!["true"]);
        assert_eq!(
            RecordValue::Number(serde_json::Number::from(7)).as_strings(),
            vec!["7"]
        );
        assert_eq!(
            RecordValue::List(vec!["a".into(), "b".into()]).as_strings(),
            vec!["a", "b"]
        );
    }
}
