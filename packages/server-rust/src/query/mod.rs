//! Query engine: translates query documents into matchers and runs them
//! with exact skip/limit semantics.
//!
//! Parsing and clause evaluation live in `slookup-core`; this module is
//! the server-side seam that feeds stores and the archive, and the
//! matcher-only entry point the subscription fan-out uses.

use serde_json::Value;
use slookup_core::{Query, Record, RecordMatcher, RegistryError};
use url::form_urlencoded;

use crate::storage::{ArchiveStore, RecordStore};

/// Stateless query front end.
pub struct QueryEngine;

impl QueryEngine {
    /// Parses a JSON body into an executable query.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` for non-object bodies, unrepresentable values,
    /// unknown operators, or bad paging controls.
    pub fn parse_document(body: Value) -> Result<Query, RegistryError> {
        let document = Record::from_json(body)?;
        Ok(Query::from_record(&document)?)
    }

    /// Parses a raw (still percent-encoded) HTTP query string.
    ///
    /// Every parameter is a match clause except the reserved controls;
    /// comma-separated values split into lists.
    ///
    /// # Errors
    ///
    /// Same rules as [`QueryEngine::parse_document`].
    pub fn parse_query_string(raw: Option<&str>) -> Result<Query, RegistryError> {
        let raw = raw.unwrap_or_default();
        let pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Query::from_pairs(pairs)?)
    }

    /// Compiles a saved-query document into its matcher only.
    ///
    /// Paging controls are accepted and discarded; the fan-out never
    /// pages.
    ///
    /// # Errors
    ///
    /// Same rules as [`QueryEngine::parse_document`].
    pub fn compile_matcher(document: &Record) -> Result<RecordMatcher, RegistryError> {
        Ok(Query::from_record(document)?.matcher)
    }

    /// Runs a query against a record store.
    ///
    /// # Errors
    ///
    /// `INTERNAL_ERROR` on backend failure.
    pub async fn execute(
        store: &dyn RecordStore,
        query: &Query,
    ) -> Result<Vec<Record>, RegistryError> {
        store
            .query(&query.matcher, query.skip, query.max_results)
            .await
            .map_err(RegistryError::from)
    }

    /// Runs a query against the archive view.
    #[must_use]
    pub fn execute_archive(archive: &ArchiveStore, query: &Query) -> Vec<Record> {
        archive.query(&query.matcher, query.skip, query.max_results)
    }
}
