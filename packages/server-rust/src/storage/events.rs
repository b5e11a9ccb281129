//! Commit events and the record observer chain.
//!
//! Every store mutation emits a [`RecordEvent`] carrying the committed
//! record snapshot and its monotonic sequence number. Observers react to
//! the event inside the store's commit section, so for any single URI the
//! chain sees events in exactly the order the store committed them. That
//! property is what the subscription fan-out's per-subscription ordering
//! guarantee rests on, so observers must stay cheap: hand off, never block.

use std::sync::Arc;

use slookup_core::Record;

/// One committed mutation: the record snapshot as of the commit.
///
/// The snapshot carries the post-commit state (`REGISTER`, `RENEW`,
/// `DELETE`, or `EXPIRED`); removals stamp the terminal state before
/// emitting.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    /// Store-wide monotonic commit sequence.
    pub seq: u64,
    /// Identity of the mutated record.
    pub uri: String,
    /// The committed snapshot.
    pub record: Record,
}

/// Observer for committed record mutations.
///
/// Implementations feed the subscription fan-out, maintain the archive
/// view, or bump metrics. Used as `Arc<dyn RecordObserver>`.
pub trait RecordObserver: Send + Sync {
    /// Called after each commit, in commit order.
    fn on_committed(&self, event: &RecordEvent);
}

/// Composite observer that fans one event out to multiple observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn RecordObserver>>,
}

impl CompositeObserver {
    /// Creates a composite over the given observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn RecordObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn RecordObserver>) {
        self.observers.push(observer);
    }
}

impl RecordObserver for CompositeObserver {
    fn on_committed(&self, event: &RecordEvent) {
        for observer in &self.observers {
            observer.on_committed(event);
        }
    }
}

/// Observer that ignores every event. Stand-in for tests and tooling.
pub struct NullObserver;

impl RecordObserver for NullObserver {
    fn on_committed(&self, _event: &RecordEvent) {}
}

/// Observer that counts commits per lifecycle state.
pub struct MetricsObserver;

impl RecordObserver for MetricsObserver {
    fn on_committed(&self, event: &RecordEvent) {
        let state = event
            .record
            .state()
            .map_or("UNKNOWN", slookup_core::RecordState::as_str);
        metrics::counter!("slookup_record_commits_total", "state" => state).increment(1);
    }
}
