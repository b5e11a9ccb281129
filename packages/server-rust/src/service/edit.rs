//! Edit service: renew and delete with the authorization hook.
//!
//! Renewals re-run lease admission; deletes release the lease and let
//! the store stamp the `DELETE` tombstone. Both paths fan out through
//! the store's observer chain, never directly.

use serde_json::Value;
use slookup_core::{keys, Record, RecordState, RegistryError};
use tracing::{debug, info};

use crate::service::context::AppContext;
use crate::storage::StoreError;

/// Renew/delete entry point.
pub struct EditService;

impl EditService {
    /// Renews a record: applies the delta's TTL (or keeps the stored
    /// one), re-admits the lease, bumps the expiry, and sets `RENEW`.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND`: unknown URI (including losing a race to delete).
    /// - `FORBIDDEN`: token mismatch, or lease re-admission denied.
    /// - `BAD_REQUEST`: malformed delta or TTL.
    /// - `INTERNAL_ERROR`: persistence failure.
    pub async fn renew(ctx: &AppContext, uri: &str, delta: Value) -> Result<Record, RegistryError> {
        let delta = Record::from_json(delta)?;

        let Some(mut record) = ctx.store.get_by_uri(uri).await.map_err(RegistryError::from)?
        else {
            return Err(RegistryError::NotFound(uri.to_string()));
        };

        if !ctx.authorizer.authorize(&record, delta.client_uuid()) {
            debug!(uri, "renew denied: access token mismatch");
            return Err(RegistryError::Forbidden("access token mismatch".to_string()));
        }

        if let Some(ttl) = delta.get(keys::RECORD_TTL) {
            record.set(keys::RECORD_TTL, ttl.clone());
        }

        if !ctx.leases.request_lease(&mut record)? {
            return Err(RegistryError::Forbidden("failed to secure lease".to_string()));
        }
        record.set_state(RecordState::Renew);

        match ctx.store.update(uri, record).await {
            Ok(stored) => {
                info!(uri, "record renewed");
                metrics::counter!("slookup_renewals_total").increment(1);
                Ok(stored)
            }
            Err(StoreError::NotFound(_)) => {
                // A concurrent delete committed first; undo our lease.
                ctx.leases.release(uri);
                Err(RegistryError::NotFound(uri.to_string()))
            }
            Err(error) => {
                tracing::error!(uri, %error, "renew failed to persist");
                Err(RegistryError::Internal(error.to_string()))
            }
        }
    }

    /// Deletes a record, returning the `DELETE`-stamped tombstone.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND`: unknown URI.
    /// - `FORBIDDEN`: token mismatch.
    /// - `BAD_REQUEST`: malformed auth body.
    /// - `INTERNAL_ERROR`: persistence failure.
    pub async fn delete(
        ctx: &AppContext,
        uri: &str,
        auth_body: Option<Value>,
    ) -> Result<Record, RegistryError> {
        let presented = match auth_body {
            None => None,
            Some(body) => Some(Record::from_json(body)?),
        };
        let presented_token = presented.as_ref().and_then(Record::client_uuid);

        let Some(record) = ctx.store.get_by_uri(uri).await.map_err(RegistryError::from)? else {
            return Err(RegistryError::NotFound(uri.to_string()));
        };
        if !ctx.authorizer.authorize(&record, presented_token) {
            debug!(uri, "delete denied: access token mismatch");
            return Err(RegistryError::Forbidden("access token mismatch".to_string()));
        }

        let Some(deleted) = ctx.store.delete(uri).await.map_err(RegistryError::from)? else {
            // Lost a race to another delete or to expiry.
            return Err(RegistryError::NotFound(uri.to_string()));
        };
        ctx.leases.release(uri);
        info!(uri, "record deleted");
        metrics::counter!("slookup_deletes_total").increment(1);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::service::auth::DenyAll;
    use crate::service::config::ServerConfig;
    use crate::service::registration::tests::{test_context, START};
    use crate::service::registration::RegistrationService;

    async fn registered(ctx: &AppContext, token: Option<&str>) -> Record {
        let mut body = json!({
            "type": ["service"],
            "service-name": ["alpha"],
            "record-ttl": ["PT1H"],
        });
        if let Some(token) = token {
            body["client-uuid"] = json!([token]);
        }
        RegistrationService::register(ctx, body).await.unwrap()
    }

    #[tokio::test]
    async fn renew_extends_expiry_and_sets_state() {
        let (ctx, clock) = test_context(ServerConfig::default()).await;
        let stored = registered(&ctx, None).await;
        let uri = stored.uri().unwrap().to_string();

        clock.advance(60_000);
        let renewed = EditService::renew(&ctx, &uri, json!({"record-ttl": ["PT2H"]}))
            .await
            .unwrap();

        assert_eq!(renewed.state(), Some(slookup_core::RecordState::Renew));
        assert_eq!(renewed.expires_at_ms(), Some(START + 60_000 + 7_200_000));

        let fetched = ctx.store.get_by_uri(&uri).await.unwrap().unwrap();
        assert_eq!(fetched, renewed);
    }

    #[tokio::test]
    async fn renew_without_ttl_keeps_the_stored_one() {
        let (ctx, clock) = test_context(ServerConfig::default()).await;
        let stored = registered(&ctx, None).await;
        let uri = stored.uri().unwrap().to_string();

        clock.advance(30_000);
        let renewed = EditService::renew(&ctx, &uri, json!({})).await.unwrap();
        // Same PT1H TTL, recomputed from the new now.
        assert_eq!(renewed.expires_at_ms(), Some(START + 30_000 + 3_600_000));
    }

    #[tokio::test]
    async fn renew_unknown_uri_is_not_found() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let err = EditService::renew(&ctx, "lookup/records/ghost", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn token_mismatch_is_forbidden() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let stored = registered(&ctx, Some("secret")).await;
        let uri = stored.uri().unwrap().to_string();

        let wrong = EditService::renew(&ctx, &uri, json!({"client-uuid": ["nope"]}))
            .await
            .unwrap_err();
        assert_eq!(wrong.kind(), "FORBIDDEN");

        let missing = EditService::delete(&ctx, &uri, None).await.unwrap_err();
        assert_eq!(missing.kind(), "FORBIDDEN");

        let right = EditService::renew(&ctx, &uri, json!({"client-uuid": ["secret"]})).await;
        assert!(right.is_ok());
    }

    #[tokio::test]
    async fn authorizer_is_an_injection_point() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let stored = registered(&ctx, None).await;
        let uri = stored.uri().unwrap().to_string();

        let deny_ctx = AppContext {
            config: Arc::clone(&ctx.config),
            store: Arc::clone(&ctx.store),
            archive: Arc::clone(&ctx.archive),
            leases: Arc::clone(&ctx.leases),
            subscriptions: Arc::clone(&ctx.subscriptions),
            authorizer: Arc::new(DenyAll),
            clock: Arc::clone(&ctx.clock),
        };
        let err = EditService::renew(&deny_ctx, &uri, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn delete_returns_tombstone_and_releases_lease() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let stored = registered(&ctx, None).await;
        let uri = stored.uri().unwrap().to_string();
        assert_eq!(ctx.leases.active_count(), 1);

        let tombstone = EditService::delete(&ctx, &uri, None).await.unwrap();
        assert_eq!(tombstone.state(), Some(slookup_core::RecordState::Delete));
        assert_eq!(ctx.leases.active_count(), 0);
        assert_eq!(ctx.store.count().await, 0);

        let again = EditService::delete(&ctx, &uri, None).await.unwrap_err();
        assert_eq!(again.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn interleaved_edits_linearize_per_uri() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let stored = registered(&ctx, None).await;
        let uri = stored.uri().unwrap().to_string();

        EditService::renew(&ctx, &uri, json!({"record-ttl": ["PT2H"]}))
            .await
            .unwrap();
        EditService::delete(&ctx, &uri, None).await.unwrap();

        // After delete commits, a renew observes NOT_FOUND and leaves no
        // lease behind.
        let late = EditService::renew(&ctx, &uri, json!({})).await.unwrap_err();
        assert_eq!(late.kind(), "NOT_FOUND");
        assert_eq!(ctx.leases.active_count(), 0);
        assert!(ctx.store.get_by_uri(&uri).await.unwrap().is_none());
    }
}
