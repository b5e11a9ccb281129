//! `slookup` Core -- record model, reserved keys, TTL durations, and query matching.
//!
//! This crate is the pure foundation layer for the Simple Lookup Service:
//!
//! - **Keys** ([`keys`]): reserved wire-key constants (`record-uri`, ...)
//! - **Records** ([`record`]): `Record`, `RecordValue`, `RecordState`
//! - **TTL** ([`ttl`]): ISO-8601 duration parsing and formatting
//! - **Queries** ([`query`]): query documents, operators, `RecordMatcher`
//! - **Errors** ([`error`]): the client-facing error taxonomy
//!
//! No IO and no async: everything here is data and predicates, shared by
//! the server and by any client tooling.

pub mod error;
pub mod keys;
pub mod query;
pub mod record;
pub mod ttl;

pub use error::RegistryError;
pub use query::{Query, QueryOperator, QueryParseError, RecordMatcher};
pub use record::{Record, RecordError, RecordState, RecordValue};
pub use ttl::{format_duration, parse_duration, TtlError};
