//! Application context: the explicit object every handler works through.
//!
//! There is no process-wide state. [`AppContext::build`] wires the whole
//! pipeline -- observer chain, stores, lease manager, subscription
//! manager -- and returns the context plus a [`ServiceRegistry`] holding
//! the background subsystems. Tests build fresh contexts with injected
//! clocks and push clients.

use std::sync::Arc;

use crate::lease::{Clock, LeaseManager};
use crate::maintenance::MaintenanceScheduler;
use crate::service::auth::Authorizer;
use crate::service::config::ServerConfig;
use crate::service::registry::ServiceRegistry;
use crate::storage::{
    build_stores, ArchiveObserver, ArchiveStore, CompositeObserver, MetricsObserver, RecordObserver,
    RecordStore,
};
use crate::subscription::{FanoutObserver, PushClient, SubscriptionManager};

/// Shared handles for one cache instance.
pub struct AppContext {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live record store.
    pub store: Arc<dyn RecordStore>,
    /// Read-only archive of historical/tombstoned records.
    pub archive: Arc<ArchiveStore>,
    /// Lease admission and TTL bookkeeping.
    pub leases: Arc<LeaseManager>,
    /// Saved queries and delivery queues.
    pub subscriptions: Arc<SubscriptionManager>,
    /// Edit authorization policy.
    pub authorizer: Arc<dyn Authorizer>,
    /// Time source shared by leases and flush scheduling.
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Wires a complete context and its background-service registry.
    ///
    /// The observer chain is fan-out feed, then archive, then metrics;
    /// persisted records get their leases restored and persisted
    /// subscriptions come back live. Callers still run
    /// `registry.init_all` to start the background workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be opened.
    pub async fn build(
        config: ServerConfig,
        push: Arc<dyn PushClient>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<(Arc<Self>, ServiceRegistry)> {
        let config = Arc::new(config);

        let archive = Arc::new(ArchiveStore::new());
        let (fanout, events) = FanoutObserver::channel();
        let observer = Arc::new(CompositeObserver::new(vec![
            Arc::new(fanout) as Arc<dyn RecordObserver>,
            Arc::new(ArchiveObserver::new(Arc::clone(&archive))),
            Arc::new(MetricsObserver),
        ]));

        let (store, subscription_store) = build_stores(&config, observer)?;

        let subscriptions = Arc::new(SubscriptionManager::new(
            config.subscription.clone(),
            push,
            Arc::clone(&clock),
            subscription_store,
            events,
        ));
        subscriptions.restore_persisted();

        let leases = Arc::new(LeaseManager::new(
            config.lease.capacity,
            config.lease.default_ttl(),
            config.lease.max_ttl(),
            Arc::clone(&clock),
        ));

        // A persistent backend comes up holding records with no leases;
        // restore them from their own expiry stamps before serving.
        let live = store
            .query(&slookup_core::Query::match_all().matcher, 0, 0)
            .await?;
        leases.reconcile(live.into_iter().filter_map(|record| {
            let uri = record.uri()?.to_string();
            Some((uri, record.expires_at_ms()))
        }));

        let ctx = Arc::new(Self {
            config,
            store,
            archive,
            leases,
            subscriptions: Arc::clone(&subscriptions),
            authorizer,
            clock,
        });

        let registry = ServiceRegistry::new();
        registry.register(subscriptions);
        registry.register(Arc::new(MaintenanceScheduler::new(Arc::clone(&ctx))));

        Ok((ctx, registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::ManualClock;
    use crate::service::auth::TokenAuthorizer;
    use crate::service::registry::ServiceContext;
    use crate::subscription::push::RecordingPushClient;

    #[tokio::test]
    async fn build_produces_fresh_independent_contexts() {
        let make = || async {
            AppContext::build(
                ServerConfig::default(),
                Arc::new(RecordingPushClient::new()),
                Arc::new(TokenAuthorizer),
                Arc::new(ManualClock::new(0)),
            )
            .await
            .unwrap()
        };
        let (ctx_a, _) = make().await;
        let (ctx_b, _) = make().await;

        assert_eq!(ctx_a.store.count().await, 0);
        assert!(!Arc::ptr_eq(&ctx_a.archive, &ctx_b.archive));
    }

    #[tokio::test]
    async fn registry_starts_and_stops_background_services() {
        let (ctx, registry) = AppContext::build(
            ServerConfig::default(),
            Arc::new(RecordingPushClient::new()),
            Arc::new(TokenAuthorizer),
            Arc::new(ManualClock::new(0)),
        )
        .await
        .unwrap();

        let svc_ctx = ServiceContext {
            config: Arc::clone(&ctx.config),
        };
        registry.init_all(&svc_ctx).await.unwrap();
        assert!(registry.get_by_name("subscriptions").is_some());
        assert!(registry.get_by_name("maintenance").is_some());
        registry.shutdown_all().await.unwrap();
    }
}
