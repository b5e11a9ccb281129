//! Query service: thin orchestrator over the query engine, routing the
//! live and archive namespaces.

use slookup_core::{Record, RegistryError};
use tracing::debug;

use crate::query::QueryEngine;
use crate::service::context::AppContext;

/// Namespace routing over the query engine.
pub struct QueryService;

impl QueryService {
    /// Runs a query-string query against the live store.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` on malformed queries, `INTERNAL_ERROR` on store
    /// failure.
    pub async fn search_live(
        ctx: &AppContext,
        raw_query: Option<&str>,
    ) -> Result<Vec<Record>, RegistryError> {
        let query = QueryEngine::parse_query_string(raw_query)?;
        let results = QueryEngine::execute(ctx.store.as_ref(), &query).await?;
        debug!(matches = results.len(), "live query served");
        Ok(results)
    }

    /// Runs a query-string query against the archive namespace.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` on malformed queries.
    pub fn search_archive(
        ctx: &AppContext,
        raw_query: Option<&str>,
    ) -> Result<Vec<Record>, RegistryError> {
        let query = QueryEngine::parse_query_string(raw_query)?;
        let results = QueryEngine::execute_archive(&ctx.archive, &query);
        debug!(matches = results.len(), "archive query served");
        Ok(results)
    }

    /// Fetches one live record by URI.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown URIs, `INTERNAL_ERROR` on store failure.
    pub async fn get(ctx: &AppContext, uri: &str) -> Result<Record, RegistryError> {
        ctx.store
            .get_by_uri(uri)
            .await
            .map_err(RegistryError::from)?
            .ok_or_else(|| RegistryError::NotFound(uri.to_string()))
    }
}
