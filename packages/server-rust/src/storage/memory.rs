//! In-memory [`RecordStore`] backed by [`DashMap`].
//!
//! The default backend. Reads are lock-free; every mutation runs under a
//! single commit mutex that assigns the monotonic sequence number and
//! emits the commit event before releasing, so the observer chain sees
//! commits in order. Hold time is bounded to one map operation plus the
//! observer hand-off.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use slookup_core::{Record, RecordMatcher, RecordState};

use super::events::{NullObserver, RecordEvent, RecordObserver};
use super::store::{page, RecordStore, StoreError};

/// One stored entry: the record plus its last commit sequence.
#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    record: Record,
}

/// In-memory record store.
pub struct MemoryStore {
    entries: DashMap<String, Stored>,
    /// Next commit sequence; doubles as the write-serialization lock.
    commit: parking_lot::Mutex<u64>,
    observer: Arc<dyn RecordObserver>,
}

impl MemoryStore {
    /// Creates an empty store wired to the given observer chain.
    #[must_use]
    pub fn new(observer: Arc<dyn RecordObserver>) -> Self {
        Self {
            entries: DashMap::new(),
            commit: parking_lot::Mutex::new(0),
            observer,
        }
    }

    /// Creates a store with no observers, for tests and tooling.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Arc::new(NullObserver))
    }

    /// Stamps, stores, and publishes one commit. Must run under `commit`.
    fn publish(&self, seq: &mut u64, uri: &str, record: &Record) {
        *seq += 1;
        self.observer.on_committed(&RecordEvent {
            seq: *seq,
            uri: uri.to_string(),
            record: record.clone(),
        });
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, mut record: Record) -> Result<Record, StoreError> {
        let uri = record
            .uri()
            .ok_or_else(|| StoreError::Backend("insert without a stamped URI".to_string()))?
            .to_string();

        let mut seq = self.commit.lock();
        if self.entries.contains_key(&uri) {
            return Err(StoreError::Duplicate(uri));
        }
        record.set_uri(uri.clone());
        self.publish(&mut seq, &uri, &record);
        self.entries.insert(
            uri,
            Stored {
                seq: *seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn get_by_uri(&self, uri: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.entries.get(uri).map(|entry| entry.record.clone()))
    }

    async fn update(&self, uri: &str, mut record: Record) -> Result<Record, StoreError> {
        let mut seq = self.commit.lock();
        let Some(mut entry) = self.entries.get_mut(uri) else {
            return Err(StoreError::NotFound(uri.to_string()));
        };
        record.set_uri(uri);
        self.publish(&mut seq, uri, &record);
        entry.seq = *seq;
        entry.record = record.clone();
        Ok(record)
    }

    async fn delete(&self, uri: &str) -> Result<Option<Record>, StoreError> {
        let mut seq = self.commit.lock();
        let Some((_, stored)) = self.entries.remove(uri) else {
            return Ok(None);
        };
        let mut record = stored.record;
        record.set_state(RecordState::Delete);
        self.publish(&mut seq, uri, &record);
        Ok(Some(record))
    }

    async fn query(
        &self,
        matcher: &RecordMatcher,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let mut matches: Vec<(u64, Record)> = self
            .entries
            .iter()
            .filter(|entry| matcher.matches(&entry.record))
            .map(|entry| (entry.seq, entry.record.clone()))
            .collect();
        matches.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(page(
            matches.into_iter().map(|(_, r)| r).collect(),
            skip,
            limit,
        ))
    }

    async fn prune_expired(&self, now_ms: i64, threshold_ms: i64) -> Result<u64, StoreError> {
        // Candidates are collected without the commit lock; each removal
        // re-checks under the lock so a concurrent renewal wins.
        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| is_expired(&entry.record, now_ms, threshold_ms))
            .map(|entry| entry.key().clone())
            .collect();

        let mut pruned = 0;
        for uri in candidates {
            let mut seq = self.commit.lock();
            let still_expired = self
                .entries
                .get(&uri)
                .is_some_and(|entry| is_expired(&entry.record, now_ms, threshold_ms));
            if !still_expired {
                continue;
            }
            if let Some((_, stored)) = self.entries.remove(&uri) {
                let mut record = stored.record;
                record.set_state(RecordState::Expired);
                self.publish(&mut seq, &uri, &record);
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    async fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Expiry test: a record with no expiry stamp never expires.
fn is_expired(record: &Record, now_ms: i64, threshold_ms: i64) -> bool {
    record
        .expires_at_ms()
        .is_some_and(|expires| expires.saturating_add(threshold_ms) < now_ms)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;
    use slookup_core::Query;

    use super::*;

    fn make_record(uri: &str, loc: &str) -> Record {
        let mut record = Record::from_json(json!({
            "type": ["service"],
            "loc": [loc],
        }))
        .unwrap();
        record.set_uri(uri);
        record.set_state(RecordState::Register);
        record
    }

    #[tokio::test]
    async fn insert_get_delete_round_trip() {
        let store = MemoryStore::detached();
        let record = make_record("lookup/records/a", "east");

        let stored = store.insert(record.clone()).await.unwrap();
        assert_eq!(stored.uri(), Some("lookup/records/a"));

        let fetched = store.get_by_uri("lookup/records/a").await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        let deleted = store.delete("lookup/records/a").await.unwrap().unwrap();
        assert_eq!(deleted.state(), Some(RecordState::Delete));
        assert!(store.get_by_uri("lookup/records/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_duplicate_uri_fails() {
        let store = MemoryStore::detached();
        store
            .insert(make_record("lookup/records/a", "east"))
            .await
            .unwrap();
        let err = store
            .insert(make_record("lookup/records/a", "west"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Duplicate("lookup/records/a".into()));
    }

    #[tokio::test]
    async fn insert_without_uri_is_a_backend_error() {
        let store = MemoryStore::detached();
        let err = store.insert(Record::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn update_absent_uri_fails() {
        let store = MemoryStore::detached();
        let err = store
            .update("lookup/records/missing", make_record("lookup/records/missing", "east"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("lookup/records/missing".into()));
    }

    #[tokio::test]
    async fn delete_absent_uri_returns_none() {
        let store = MemoryStore::detached();
        assert!(store.delete("lookup/records/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_returns_commit_order_with_paging() {
        let store = MemoryStore::detached();
        for (i, loc) in ["east", "west", "east", "east"].iter().enumerate() {
            store
                .insert(make_record(&format!("lookup/records/{i}"), loc))
                .await
                .unwrap();
        }

        let q = Query::from_pairs([("loc", "east")]).unwrap();
        let all = store.query(&q.matcher, 0, 0).await.unwrap();
        let uris: Vec<_> = all.iter().filter_map(Record::uri).collect();
        assert_eq!(
            uris,
            vec!["lookup/records/0", "lookup/records/2", "lookup/records/3"]
        );

        let paged = store.query(&q.matcher, 1, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].uri(), Some("lookup/records/2"));

        let past_end = store.query(&q.matcher, 10, 0).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn identical_queries_on_unchanged_store_are_identical() {
        let store = MemoryStore::detached();
        for i in 0..5 {
            store
                .insert(make_record(&format!("lookup/records/{i}"), "east"))
                .await
                .unwrap();
        }
        let q = Query::match_all();
        let first = store.query(&q.matcher, 0, 0).await.unwrap();
        let second = store.query(&q.matcher, 0, 0).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn prune_removes_only_past_threshold() {
        let store = MemoryStore::detached();
        let now = 1_000_000_i64;

        let mut fresh = make_record("lookup/records/fresh", "east");
        fresh.set_expires_at_ms(now + 60_000);
        let mut stale = make_record("lookup/records/stale", "east");
        stale.set_expires_at_ms(now - 30_000);
        let mut grace = make_record("lookup/records/grace", "east");
        grace.set_expires_at_ms(now - 2_000);

        for r in [fresh, stale, grace] {
            store.insert(r).await.unwrap();
        }

        // 5s threshold: `stale` is past it, `grace` is within it.
        let pruned = store.prune_expired(now, 5_000).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get_by_uri("lookup/records/stale").await.unwrap().is_none());
        assert!(store.get_by_uri("lookup/records/grace").await.unwrap().is_some());
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn events_carry_commit_order_and_terminal_states() {
        struct Recording {
            events: Mutex<Vec<(u64, String, Option<RecordState>)>>,
            last_seq: AtomicU64,
        }
        impl RecordObserver for Recording {
            fn on_committed(&self, event: &RecordEvent) {
                // Sequences must be strictly increasing as observed.
                let prev = self.last_seq.swap(event.seq, Ordering::SeqCst);
                assert!(event.seq > prev, "seq regressed: {prev} -> {}", event.seq);
                self.events.lock().push((
                    event.seq,
                    event.uri.clone(),
                    event.record.state(),
                ));
            }
        }

        let recording = Arc::new(Recording {
            events: Mutex::new(Vec::new()),
            last_seq: AtomicU64::new(0),
        });
        let store = MemoryStore::new(Arc::clone(&recording) as Arc<dyn RecordObserver>);

        let mut record = make_record("lookup/records/a", "east");
        store.insert(record.clone()).await.unwrap();
        record.set_state(RecordState::Renew);
        store.update("lookup/records/a", record).await.unwrap();
        store.delete("lookup/records/a").await.unwrap();

        let events = recording.events.lock().clone();
        let states: Vec<_> = events.iter().map(|(_, _, s)| *s).collect();
        assert_eq!(
            states,
            vec![
                Some(RecordState::Register),
                Some(RecordState::Renew),
                Some(RecordState::Delete)
            ]
        );
    }

    #[tokio::test]
    async fn prune_emits_expired_events() {
        struct States(Mutex<Vec<Option<RecordState>>>);
        impl RecordObserver for States {
            fn on_committed(&self, event: &RecordEvent) {
                self.0.lock().push(event.record.state());
            }
        }
        let states = Arc::new(States(Mutex::new(Vec::new())));
        let store = MemoryStore::new(Arc::clone(&states) as Arc<dyn RecordObserver>);

        let mut record = make_record("lookup/records/a", "east");
        record.set_expires_at_ms(1_000);
        store.insert(record).await.unwrap();
        store.prune_expired(10_000, 0).await.unwrap();

        let seen = states.0.lock().clone();
        assert_eq!(
            seen,
            vec![Some(RecordState::Register), Some(RecordState::Expired)]
        );
    }
}
