//! Maintenance scheduler: periodic prune, flush, and memory-hygiene jobs.
//!
//! One driver owns three independent tickers, so job categories run in
//! parallel while each category runs serially (a tick's work completes
//! before the next tick of the same job is observed). Missed fires
//! coalesce into a single catch-up fire via
//! [`MissedTickBehavior::Skip`]. All jobs stop on the shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use slookup_core::Query;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::service::context::AppContext;
use crate::service::registry::{ManagedService, ServiceContext};

/// Periodic driver for prune, flush, and hygiene jobs.
pub struct MaintenanceScheduler {
    ctx: Arc<AppContext>,
    shutdown: watch::Sender<bool>,
    handles: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl MaintenanceScheduler {
    /// Creates a scheduler over the given context. Jobs start on
    /// [`ManagedService::init`].
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            shutdown,
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// One prune pass: expire overdue records, then reconcile leases
    /// against what actually remains in the store.
    pub async fn prune_once(ctx: &AppContext) {
        let now = ctx.clock.now_ms();
        let threshold = i64::try_from(ctx.config.maintenance.prune_threshold_ms).unwrap_or(0);

        match ctx.store.prune_expired(now, threshold).await {
            Ok(0) => {}
            Ok(pruned) => {
                info!(pruned, "pruned expired records");
                metrics::counter!("slookup_records_pruned_total").increment(pruned);
            }
            Err(error) => error!(%error, "prune sweep failed"),
        }

        match ctx.store.query(&Query::match_all().matcher, 0, 0).await {
            Ok(records) => {
                ctx.leases.reconcile(records.into_iter().filter_map(|record| {
                    let uri = record.uri()?.to_string();
                    Some((uri, record.expires_at_ms()))
                }));
            }
            Err(error) => error!(%error, "lease reconciliation scan failed"),
        }
    }

    /// One flush pass: time-interval-driven subscription flushes.
    pub async fn flush_once(ctx: &AppContext) {
        ctx.subscriptions.flush_due().await;
    }

    /// One hygiene pass: refresh occupancy gauges.
    ///
    /// Releasing allocator buffers back to the OS is platform-dependent
    /// and a no-op here.
    pub async fn hygiene_once(ctx: &AppContext) {
        metrics::gauge!("slookup_live_records").set(ctx.store.count().await as f64);
        metrics::gauge!("slookup_active_leases").set(ctx.leases.active_count() as f64);
        metrics::gauge!("slookup_subscriptions").set(ctx.subscriptions.count() as f64);
        metrics::gauge!("slookup_archived_records").set(ctx.archive.count() as f64);
        debug!("memory hygiene pass");
    }

    fn spawn_jobs(&self) {
        let jobs: [(&'static str, u64, JobFn); 3] = [
            (
                "prune",
                self.ctx.config.maintenance.prune_interval_ms,
                |ctx| Box::pin(async move { Self::prune_once(&ctx).await }),
            ),
            (
                "flush",
                self.ctx.config.maintenance.flush_interval_ms,
                |ctx| Box::pin(async move { Self::flush_once(&ctx).await }),
            ),
            (
                "hygiene",
                self.ctx.config.maintenance.hygiene_interval_ms,
                |ctx| Box::pin(async move { Self::hygiene_once(&ctx).await }),
            ),
        ];

        let mut handles = self.handles.lock();
        for (name, interval_ms, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let mut shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick fires immediately; consume it so jobs
                // start one full interval after boot.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => job(Arc::clone(&ctx)).await,
                        _ = shutdown.changed() => {
                            debug!(job = name, "maintenance job stopped");
                            break;
                        }
                    }
                }
            }));
        }
    }
}

type JobFn =
    fn(Arc<AppContext>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

#[async_trait]
impl ManagedService for MaintenanceScheduler {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        self.spawn_jobs();
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        Ok(())
    }
}
