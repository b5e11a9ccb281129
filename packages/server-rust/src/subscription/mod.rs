//! Subscription manager: saved queries, per-subscription queues, and
//! batched delivery.
//!
//! A single fan-out worker consumes the store's commit-event feed off the
//! write path, evaluates every subscription's saved query in matcher-only
//! mode, and appends matching records to per-subscription queues in
//! commit order. Queues flush when they reach their size threshold or
//! when their time interval elapses (driven by maintenance). Delivery is
//! serialized per subscription, bounded across subscriptions by a
//! semaphore pool, retried once within a flush, and retires the
//! subscription after too many consecutive failures.

pub mod push;

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use slookup_core::{Record, RecordMatcher, RegistryError};
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lease::Clock;
use crate::query::QueryEngine;
use crate::service::config::SubscriptionConfig;
use crate::service::registry::{ManagedService, ServiceContext};
use crate::storage::{RecordEvent, RecordObserver, StoreError};

pub use self::push::{HttpPushClient, PushClient, PushEnvelope, PushError};

/// Persistable description of one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Subscription id; assigned by the manager when empty.
    #[serde(rename = "subscription-id", default)]
    pub id: String,
    /// Saved query document evaluated against every record change.
    pub query: Record,
    /// Delivery endpoint for flush batches.
    pub endpoint: String,
    /// Per-subscription override of the size threshold.
    #[serde(rename = "max-push-events", skip_serializing_if = "Option::is_none", default)]
    pub max_push_events: Option<usize>,
    /// Per-subscription override of the time interval, in seconds.
    #[serde(rename = "time-interval", skip_serializing_if = "Option::is_none", default)]
    pub time_interval_secs: Option<u64>,
}

/// Durable home for subscription specs.
///
/// The in-memory implementation forgets on restart; the redb store keeps
/// specs next to the records.
pub trait SubscriptionStore: Send + Sync {
    /// Saves (or overwrites) a spec.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    fn save(&self, spec: &SubscriptionSpec) -> Result<(), StoreError>;

    /// Removes a spec; unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Loads every saved spec.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    fn load_all(&self) -> Result<Vec<SubscriptionSpec>, StoreError>;
}

/// Process-local [`SubscriptionStore`].
#[derive(Default)]
pub struct MemorySubscriptionStore {
    specs: DashMap<String, SubscriptionSpec>,
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn save(&self, spec: &SubscriptionSpec) -> Result<(), StoreError> {
        self.specs.insert(spec.id.clone(), spec.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.specs.remove(id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<SubscriptionSpec>, StoreError> {
        Ok(self.specs.iter().map(|entry| entry.value().clone()).collect())
    }
}

/// One live subscription with its queue and delivery bookkeeping.
#[derive(Debug)]
pub struct Subscription {
    spec: SubscriptionSpec,
    matcher: RecordMatcher,
    max_push_events: usize,
    time_interval_ms: i64,
    queue: parking_lot::Mutex<Vec<Record>>,
    last_flushed_ms: AtomicI64,
    consecutive_failures: AtomicU32,
    /// Serializes flushes: at most one in flight per subscription.
    flushing: tokio::sync::Mutex<()>,
}

impl Subscription {
    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Delivery endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.spec.endpoint
    }

    /// Records currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Consecutive delivery failures so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

/// Observer handing commit events to the fan-out worker.
///
/// The send is wait-free, so writes never stall behind a slow
/// subscriber; the bounded resource is the delivery pool.
pub struct FanoutObserver {
    tx: mpsc::UnboundedSender<RecordEvent>,
}

impl FanoutObserver {
    /// Creates the observer and the receiving end of the event feed.
    ///
    /// The receiver is handed to [`SubscriptionManager::new`]; the
    /// observer goes into the store's observer chain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RecordEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordObserver for FanoutObserver {
    fn on_committed(&self, event: &RecordEvent) {
        // The receiver only closes at shutdown; a failed send means
        // events no longer have anywhere to go.
        let _ = self.tx.send(event.clone());
    }
}

/// Shared state between the manager handle, the worker, and flush tasks.
struct Inner {
    config: SubscriptionConfig,
    subs: DashMap<String, Arc<Subscription>>,
    push: Arc<dyn PushClient>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SubscriptionStore>,
    flush_sem: Arc<Semaphore>,
}

impl Inner {
    /// Fans one commit event into every matching subscription's queue
    /// and triggers size-threshold flushes.
    fn handle_event(self: &Arc<Self>, event: &RecordEvent) {
        for entry in self.subs.iter() {
            let sub = entry.value();
            if !sub.matcher.matches(&event.record) {
                continue;
            }
            let queued = {
                let mut queue = sub.queue.lock();
                queue.push(event.record.clone());
                queue.len()
            };
            metrics::counter!("slookup_fanout_enqueued_total").increment(1);
            if queued >= sub.max_push_events {
                let inner = Arc::clone(self);
                let sub = Arc::clone(sub);
                tokio::spawn(async move {
                    inner.flush(sub).await;
                });
            }
        }
    }

    /// Drains and delivers one subscription's queue.
    ///
    /// Events arriving while delivery is in progress stay queued for the
    /// next flush. One retry within the flush; a second failure drops the
    /// batch and counts against the subscription.
    async fn flush(self: Arc<Self>, sub: Arc<Subscription>) {
        let Ok(_permit) = Arc::clone(&self.flush_sem).acquire_owned().await else {
            return;
        };
        let _serial = sub.flushing.lock().await;

        let batch: Vec<Record> = {
            let mut queue = sub.queue.lock();
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }

        let batch_len = batch.len();
        let envelope = PushEnvelope {
            subscription_id: sub.id().to_string(),
            batch,
        };

        let mut outcome = self.push.deliver(sub.endpoint(), &envelope).await;
        if let Err(ref error) = outcome {
            debug!(id = sub.id(), %error, "push failed, retrying once");
            let jitter = rand::rng().random_range(50..200);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            outcome = self.push.deliver(sub.endpoint(), &envelope).await;
        }

        match outcome {
            Ok(()) => {
                sub.consecutive_failures.store(0, Ordering::SeqCst);
                sub.last_flushed_ms.store(self.clock.now_ms(), Ordering::SeqCst);
                metrics::counter!("slookup_flush_delivered_total").increment(batch_len as u64);
            }
            Err(error) => {
                let failures = sub.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                metrics::counter!("slookup_flush_failed_total").increment(1);
                warn!(
                    id = sub.id(),
                    %error,
                    failures,
                    dropped = batch_len,
                    "push batch dropped after retry"
                );
                if failures >= self.config.max_consecutive_failures {
                    self.subs.remove(sub.id());
                    if let Err(error) = self.store.remove(sub.id()) {
                        warn!(id = sub.id(), %error, "failed to remove retired subscription");
                    }
                    warn!(id = sub.id(), "subscription retired after repeated failures");
                }
            }
        }
    }
}

/// Holds saved queries per subscriber and drives fan-out and flushing.
pub struct SubscriptionManager {
    inner: Arc<Inner>,
    events: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<RecordEvent>>>,
    worker: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SubscriptionManager {
    /// Creates the manager over an event feed from
    /// [`FanoutObserver::channel`].
    ///
    /// The worker consuming the feed starts on [`ManagedService::init`].
    #[must_use]
    pub fn new(
        config: SubscriptionConfig,
        push: Arc<dyn PushClient>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SubscriptionStore>,
        events: mpsc::UnboundedReceiver<RecordEvent>,
    ) -> Self {
        let flush_sem = Arc::new(Semaphore::new(config.flush_concurrency.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                subs: DashMap::new(),
                push,
                clock,
                store,
                flush_sem,
            }),
            events: parking_lot::Mutex::new(Some(events)),
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Creates a subscription from a spec; assigns an id when absent.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` if the saved query does not compile or the endpoint
    /// is empty.
    pub fn subscribe(&self, mut spec: SubscriptionSpec) -> Result<Arc<Subscription>, RegistryError> {
        let matcher = QueryEngine::compile_matcher(&spec.query)?;
        if spec.endpoint.trim().is_empty() {
            return Err(RegistryError::BadRequest(
                "subscription endpoint must not be empty".to_string(),
            ));
        }
        if spec.id.is_empty() {
            spec.id = Uuid::new_v4().to_string();
        }

        let subscription = Arc::new(Subscription {
            matcher,
            max_push_events: spec
                .max_push_events
                .unwrap_or(self.inner.config.max_push_events)
                .max(1),
            time_interval_ms: i64::try_from(
                spec.time_interval_secs
                    .unwrap_or(self.inner.config.time_interval_secs),
            )
            .unwrap_or(i64::MAX)
            .saturating_mul(1_000),
            queue: parking_lot::Mutex::new(Vec::new()),
            last_flushed_ms: AtomicI64::new(self.inner.clock.now_ms()),
            consecutive_failures: AtomicU32::new(0),
            flushing: tokio::sync::Mutex::new(()),
            spec,
        });

        if let Err(error) = self.inner.store.save(&subscription.spec) {
            warn!(id = subscription.id(), %error, "failed to persist subscription");
        }
        self.inner
            .subs
            .insert(subscription.id().to_string(), Arc::clone(&subscription));
        metrics::gauge!("slookup_subscriptions").set(self.inner.subs.len() as f64);
        Ok(subscription)
    }

    /// Destroys a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let existed = self.inner.subs.remove(id).is_some();
        if existed {
            if let Err(error) = self.inner.store.remove(id) {
                warn!(id, %error, "failed to remove persisted subscription");
            }
            metrics::gauge!("slookup_subscriptions").set(self.inner.subs.len() as f64);
        }
        existed
    }

    /// Looks up a live subscription.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Subscription>> {
        self.inner.subs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.subs.len()
    }

    /// Restores persisted subscriptions (after a restart). Returns how
    /// many were restored.
    pub fn restore_persisted(&self) -> usize {
        let specs = match self.inner.store.load_all() {
            Ok(specs) => specs,
            Err(error) => {
                warn!(%error, "failed to load persisted subscriptions");
                return 0;
            }
        };
        let mut restored = 0;
        for spec in specs {
            match self.subscribe(spec) {
                Ok(_) => restored += 1,
                Err(error) => warn!(%error, "dropping unrestorable subscription"),
            }
        }
        restored
    }

    /// Flushes every subscription whose time interval has elapsed.
    ///
    /// Driven by the maintenance scheduler; flushes run concurrently,
    /// bounded by the shared delivery pool.
    pub async fn flush_due(&self) {
        let now = self.inner.clock.now_ms();
        let due: Vec<Arc<Subscription>> = self
            .inner
            .subs
            .iter()
            .filter(|entry| {
                let sub = entry.value();
                sub.queued() > 0
                    && now - sub.last_flushed_ms.load(Ordering::SeqCst) >= sub.time_interval_ms
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let flushes = due
            .into_iter()
            .map(|sub| Arc::clone(&self.inner).flush(sub));
        futures_util::future::join_all(flushes).await;
    }
}

#[async_trait]
impl ManagedService for SubscriptionManager {
    fn name(&self) -> &'static str {
        "subscriptions"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        let Some(mut rx) = self.events.lock().take() else {
            anyhow::bail!("subscription fan-out worker already started");
        };
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.handle_event(&event);
            }
            debug!("fan-out event feed closed");
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}
