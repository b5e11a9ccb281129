//! Registration service: validates, assigns identity, admits, stores.
//!
//! Fan-out is not called here -- the store's observer chain publishes the
//! commit, which keeps event order identical to commit order.

use serde_json::Value;
use slookup_core::{keys, Record, RecordState, RegistryError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::service::context::AppContext;
use crate::storage::StoreError;

/// Registration entry point.
pub struct RegistrationService;

impl RegistrationService {
    /// Registers a proposed record and returns the stored result,
    /// including the assigned URI and computed expiry.
    ///
    /// # Errors
    ///
    /// - `BAD_REQUEST`: non-object body, unrepresentable values, missing
    ///   `type`, no identifying payload, malformed TTL.
    /// - `SERVICE_UNAVAILABLE`: lease capacity exhausted.
    /// - `INTERNAL_ERROR`: store failure, or URI collision twice in a row.
    pub async fn register(ctx: &AppContext, body: Value) -> Result<Record, RegistryError> {
        let mut record = Record::from_json(body)?;
        record.normalize_type_alias();

        let Some(record_type) = record.record_type().map(str::to_string) else {
            return Err(RegistryError::BadRequest(
                "record must carry a `type` attribute".to_string(),
            ));
        };
        if !record.has_identifying_payload() {
            return Err(RegistryError::BadRequest(
                "record must carry at least one identifying payload key".to_string(),
            ));
        }
        reject_reserved_overrides(&record)?;
        // Surface a malformed TTL before taking a lease.
        record.ttl()?;

        let mut retried = false;
        loop {
            let uri = ctx.config.record_uri(&Uuid::new_v4().to_string());
            record.set_uri(uri.clone());

            if !ctx.leases.request_lease(&mut record)? {
                debug!(uri, "registration denied: no lease capacity");
                return Err(RegistryError::Unavailable(
                    "lease capacity exhausted".to_string(),
                ));
            }
            record.set_state(RecordState::Register);

            match ctx.store.insert(record.clone()).await {
                Ok(stored) => {
                    info!(uri, r#type = record_type, "record registered");
                    metrics::counter!("slookup_registrations_total").increment(1);
                    return Ok(stored);
                }
                Err(StoreError::Duplicate(_)) if !retried => {
                    // Freak collision: drop this lease and try one fresh URI.
                    ctx.leases.release(&uri);
                    retried = true;
                }
                Err(error) => {
                    ctx.leases.release(&uri);
                    tracing::error!(uri, %error, "registration failed to persist");
                    return Err(RegistryError::Internal(error.to_string()));
                }
            }
        }
    }
}

/// Rejects attributes only the service itself may stamp.
pub fn reject_reserved_overrides(record: &Record) -> Result<(), RegistryError> {
    for key in [keys::RECORD_URI, keys::RECORD_EXPIRES, keys::RECORD_STATE] {
        if record.get(key).is_some() {
            return Err(RegistryError::BadRequest(format!(
                "`{key}` is assigned by the service and cannot be supplied"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::lease::{Clock, ManualClock};
    use crate::service::auth::TokenAuthorizer;
    use crate::service::config::ServerConfig;
    use crate::service::context::AppContext;
    use crate::subscription::push::RecordingPushClient;
    use crate::subscription::PushClient;

    pub(crate) const START: i64 = 1_700_000_000_000;

    pub(crate) async fn test_context(config: ServerConfig) -> (Arc<AppContext>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let (ctx, _registry) = AppContext::build(
            config,
            Arc::new(RecordingPushClient::new()) as Arc<dyn PushClient>,
            Arc::new(TokenAuthorizer),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .await
        .unwrap();
        (ctx, clock)
    }

    fn service_body() -> Value {
        json!({
            "type": ["service"],
            "service-name": ["alpha"],
            "record-ttl": ["PT1H"],
        })
    }

    #[tokio::test]
    async fn register_assigns_uri_state_and_expiry() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let stored = RegistrationService::register(&ctx, service_body())
            .await
            .unwrap();

        let uri = stored.uri().unwrap();
        assert!(uri.starts_with("lookup/records/"), "got {uri}");
        assert_eq!(stored.state(), Some(RecordState::Register));
        assert_eq!(stored.expires_at_ms(), Some(START + 3_600_000));
        assert_eq!(ctx.leases.active_count(), 1);

        // Round trip: stored record is retrievable and identical.
        let fetched = ctx.store.get_by_uri(uri).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn register_without_type_or_payload_is_rejected() {
        let (ctx, _) = test_context(ServerConfig::default()).await;

        let no_type = json!({"service-name": ["alpha"]});
        assert_eq!(
            RegistrationService::register(&ctx, no_type)
                .await
                .unwrap_err()
                .kind(),
            "BAD_REQUEST"
        );

        let only_type = json!({"type": ["service"]});
        assert_eq!(
            RegistrationService::register(&ctx, only_type)
                .await
                .unwrap_err()
                .kind(),
            "BAD_REQUEST"
        );

        let not_object = json!(["service"]);
        assert_eq!(
            RegistrationService::register(&ctx, not_object)
                .await
                .unwrap_err()
                .kind(),
            "BAD_REQUEST"
        );
    }

    #[tokio::test]
    async fn register_with_bad_ttl_takes_no_lease() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let body = json!({
            "type": ["service"],
            "service-name": ["alpha"],
            "record-ttl": ["soon"],
        });
        assert_eq!(
            RegistrationService::register(&ctx, body)
                .await
                .unwrap_err()
                .kind(),
            "BAD_REQUEST"
        );
        assert_eq!(ctx.leases.active_count(), 0);
    }

    #[tokio::test]
    async fn lease_exhaustion_is_service_unavailable() {
        let mut config = ServerConfig::default();
        config.lease.capacity = 1;
        let (ctx, _) = test_context(config).await;

        RegistrationService::register(&ctx, service_body())
            .await
            .unwrap();
        let err = RegistrationService::register(&ctx, service_body())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SERVICE_UNAVAILABLE");
        assert_eq!(ctx.store.count().await, 1);
    }

    #[tokio::test]
    async fn record_type_alias_is_accepted() {
        let (ctx, _) = test_context(ServerConfig::default()).await;
        let body = json!({
            "record-type": ["host"],
            "host-name": ["h1"],
        });
        let stored = RegistrationService::register(&ctx, body).await.unwrap();
        assert_eq!(stored.record_type(), Some("host"));
    }

    #[test]
    fn reserved_overrides_are_rejected() {
        let record = Record::from_json(json!({
            "type": ["service"],
            "record-uri": ["lookup/records/fake"],
        }))
        .unwrap();
        assert!(reject_reserved_overrides(&record).is_err());

        let clean = Record::from_json(json!({"type": ["service"]})).unwrap();
        assert!(reject_reserved_overrides(&clean).is_ok());
    }
}
