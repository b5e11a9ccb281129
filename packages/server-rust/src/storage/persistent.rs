//! Persistent [`RecordStore`] backed by [`redb`].
//!
//! Records and subscription specs are JSON-encoded into redb tables so
//! both survive process restart. The commit sequence is persisted
//! alongside, keeping query ordering and URI uniqueness stable across
//! restarts. Commit events are emitted only after the transaction has
//! durably committed, still under the commit lock, so observers see the
//! same ordering guarantees as the in-memory backend.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use slookup_core::{Record, RecordMatcher, RecordState};

use super::events::{RecordEvent, RecordObserver};
use super::store::{page, RecordStore, StoreError};
use crate::subscription::{SubscriptionSpec, SubscriptionStore};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const SUBSCRIPTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("subscriptions");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQ_KEY: &str = "commit-seq";

/// JSON envelope stored per record: the record plus its commit sequence.
#[derive(Debug, Serialize, Deserialize)]
struct Stored {
    seq: u64,
    record: Record,
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Persistent record store.
pub struct RedbStore {
    db: Database,
    /// Next commit sequence; doubles as the write-serialization lock.
    commit: parking_lot::Mutex<u64>,
    observer: Arc<dyn RecordObserver>,
}

impl RedbStore {
    /// Opens (or creates) the database file and restores the commit
    /// sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the file cannot be opened or
    /// its tables are unreadable.
    pub fn open(
        path: impl AsRef<Path>,
        observer: Arc<dyn RecordObserver>,
    ) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;

        // Opening every table once makes later read transactions
        // infallible with respect to missing tables.
        let tx = db.begin_write().map_err(backend)?;
        {
            tx.open_table(RECORDS).map_err(backend)?;
            tx.open_table(SUBSCRIPTIONS).map_err(backend)?;
            tx.open_table(META).map_err(backend)?;
        }
        tx.commit().map_err(backend)?;

        let seq = {
            let tx = db.begin_read().map_err(backend)?;
            let meta = tx.open_table(META).map_err(backend)?;
            meta.get(SEQ_KEY)
                .map_err(backend)?
                .map_or(0, |guard| guard.value())
        };

        Ok(Self {
            db,
            commit: parking_lot::Mutex::new(seq),
            observer,
        })
    }

    /// Loads and decodes one stored record inside a read transaction.
    fn read_stored(&self, uri: &str) -> Result<Option<Stored>, StoreError> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(RECORDS).map_err(backend)?;
        match table.get(uri).map_err(backend)? {
            None => Ok(None),
            Some(guard) => serde_json::from_slice(guard.value())
                .map(Some)
                .map_err(backend),
        }
    }

    /// Decoded snapshot of every stored record.
    fn snapshot(&self) -> Result<Vec<Stored>, StoreError> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(RECORDS).map_err(backend)?;
        let mut out = Vec::new();
        for row in table.iter().map_err(backend)? {
            let (_, value) = row.map_err(backend)?;
            out.push(serde_json::from_slice(value.value()).map_err(backend)?);
        }
        Ok(out)
    }

    /// Writes one record plus the bumped sequence in a single transaction.
    fn write_record(&self, seq: u64, uri: &str, record: &Record) -> Result<(), StoreError> {
        let stored = Stored {
            seq,
            record: record.clone(),
        };
        let bytes = serde_json::to_vec(&stored).map_err(backend)?;

        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut records = tx.open_table(RECORDS).map_err(backend)?;
            records.insert(uri, bytes.as_slice()).map_err(backend)?;
            let mut meta = tx.open_table(META).map_err(backend)?;
            meta.insert(SEQ_KEY, seq).map_err(backend)?;
        }
        tx.commit().map_err(backend)
    }
}

#[async_trait]
impl RecordStore for RedbStore {
    async fn insert(&self, mut record: Record) -> Result<Record, StoreError> {
        let uri = record
            .uri()
            .ok_or_else(|| StoreError::Backend("insert without a stamped URI".to_string()))?
            .to_string();

        let mut seq = self.commit.lock();
        if self.read_stored(&uri)?.is_some() {
            return Err(StoreError::Duplicate(uri));
        }
        record.set_uri(uri.clone());
        self.write_record(*seq + 1, &uri, &record)?;
        *seq += 1;
        self.observer.on_committed(&RecordEvent {
            seq: *seq,
            uri,
            record: record.clone(),
        });
        Ok(record)
    }

    async fn get_by_uri(&self, uri: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.read_stored(uri)?.map(|stored| stored.record))
    }

    async fn update(&self, uri: &str, mut record: Record) -> Result<Record, StoreError> {
        let mut seq = self.commit.lock();
        if self.read_stored(uri)?.is_none() {
            return Err(StoreError::NotFound(uri.to_string()));
        }
        record.set_uri(uri);
        self.write_record(*seq + 1, uri, &record)?;
        *seq += 1;
        self.observer.on_committed(&RecordEvent {
            seq: *seq,
            uri: uri.to_string(),
            record: record.clone(),
        });
        Ok(record)
    }

    async fn delete(&self, uri: &str) -> Result<Option<Record>, StoreError> {
        let mut seq = self.commit.lock();

        let tx = self.db.begin_write().map_err(backend)?;
        let removed = {
            let mut records = tx.open_table(RECORDS).map_err(backend)?;
            let removed = match records.remove(uri).map_err(backend)? {
                None => None,
                Some(guard) => Some(
                    serde_json::from_slice::<Stored>(guard.value()).map_err(backend)?,
                ),
            };
            if removed.is_some() {
                let mut meta = tx.open_table(META).map_err(backend)?;
                meta.insert(SEQ_KEY, *seq + 1).map_err(backend)?;
            }
            removed
        };
        tx.commit().map_err(backend)?;

        let Some(stored) = removed else {
            return Ok(None);
        };
        let mut record = stored.record;
        record.set_state(RecordState::Delete);
        *seq += 1;
        self.observer.on_committed(&RecordEvent {
            seq: *seq,
            uri: uri.to_string(),
            record: record.clone(),
        });
        Ok(Some(record))
    }

    async fn query(
        &self,
        matcher: &RecordMatcher,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let mut matches: Vec<Stored> = self
            .snapshot()?
            .into_iter()
            .filter(|stored| matcher.matches(&stored.record))
            .collect();
        matches.sort_unstable_by_key(|stored| stored.seq);
        Ok(page(
            matches.into_iter().map(|stored| stored.record).collect(),
            skip,
            limit,
        ))
    }

    async fn prune_expired(&self, now_ms: i64, threshold_ms: i64) -> Result<u64, StoreError> {
        let is_expired = |record: &Record| {
            record
                .expires_at_ms()
                .is_some_and(|expires| expires.saturating_add(threshold_ms) < now_ms)
        };

        let mut seq = self.commit.lock();
        let expired: Vec<Stored> = self
            .snapshot()?
            .into_iter()
            .filter(|stored| is_expired(&stored.record))
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut events = Vec::with_capacity(expired.len());
        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut records = tx.open_table(RECORDS).map_err(backend)?;
            for stored in expired {
                let mut record = stored.record;
                let Some(uri) = record.uri().map(str::to_string) else {
                    continue;
                };
                records.remove(uri.as_str()).map_err(backend)?;
                record.set_state(RecordState::Expired);
                *seq += 1;
                events.push(RecordEvent {
                    seq: *seq,
                    uri,
                    record,
                });
            }
            let mut meta = tx.open_table(META).map_err(backend)?;
            meta.insert(SEQ_KEY, *seq).map_err(backend)?;
        }
        tx.commit().map_err(backend)?;

        let pruned = events.len() as u64;
        for event in &events {
            self.observer.on_committed(event);
        }
        Ok(pruned)
    }

    async fn count(&self) -> usize {
        let Ok(tx) = self.db.begin_read() else {
            return 0;
        };
        let Ok(table) = tx.open_table(RECORDS) else {
            return 0;
        };
        usize::try_from(table.len().unwrap_or(0)).unwrap_or(0)
    }
}

impl SubscriptionStore for RedbStore {
    fn save(&self, spec: &SubscriptionSpec) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(spec).map_err(backend)?;
        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut table = tx.open_table(SUBSCRIPTIONS).map_err(backend)?;
            table
                .insert(spec.id.as_str(), bytes.as_slice())
                .map_err(backend)?;
        }
        tx.commit().map_err(backend)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut table = tx.open_table(SUBSCRIPTIONS).map_err(backend)?;
            table.remove(id).map_err(backend)?;
        }
        tx.commit().map_err(backend)
    }

    fn load_all(&self) -> Result<Vec<SubscriptionSpec>, StoreError> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(SUBSCRIPTIONS).map_err(backend)?;
        let mut out = Vec::new();
        for row in table.iter().map_err(backend)? {
            let (_, value) = row.map_err(backend)?;
            out.push(serde_json::from_slice(value.value()).map_err(backend)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use slookup_core::Query;

    use super::*;
    use crate::storage::events::NullObserver;

    fn open_store(dir: &tempfile::TempDir) -> RedbStore {
        RedbStore::open(dir.path().join("slookup.redb"), Arc::new(NullObserver)).unwrap()
    }

    fn make_record(uri: &str) -> Record {
        let mut record = Record::from_json(json!({
            "type": ["service"],
            "service-name": ["alpha"],
        }))
        .unwrap();
        record.set_uri(uri);
        record.set_state(RecordState::Register);
        record
    }

    #[tokio::test]
    async fn round_trip_and_duplicate_detection() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.insert(make_record("lookup/records/a")).await.unwrap();
        assert!(matches!(
            store.insert(make_record("lookup/records/a")).await,
            Err(StoreError::Duplicate(_))
        ));

        let fetched = store.get_by_uri("lookup/records/a").await.unwrap().unwrap();
        assert_eq!(fetched.uri(), Some("lookup/records/a"));

        let deleted = store.delete("lookup/records/a").await.unwrap().unwrap();
        assert_eq!(deleted.state(), Some(RecordState::Delete));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn records_and_sequence_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.insert(make_record("lookup/records/a")).await.unwrap();
            store.insert(make_record("lookup/records/b")).await.unwrap();
        }

        let store = open_store(&dir);
        assert_eq!(store.count().await, 2);

        // New commits continue the persisted sequence: ordering keeps
        // pre-restart records first.
        store.insert(make_record("lookup/records/c")).await.unwrap();
        let all = store
            .query(&Query::match_all().matcher, 0, 0)
            .await
            .unwrap();
        let uris: Vec<_> = all.iter().filter_map(Record::uri).collect();
        assert_eq!(
            uris,
            vec!["lookup/records/a", "lookup/records/b", "lookup/records/c"]
        );
    }

    #[tokio::test]
    async fn prune_removes_expired_and_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let mut stale = make_record("lookup/records/stale");
        stale.set_expires_at_ms(1_000);
        let mut fresh = make_record("lookup/records/fresh");
        fresh.set_expires_at_ms(10_000_000);
        store.insert(stale).await.unwrap();
        store.insert(fresh).await.unwrap();

        assert_eq!(store.prune_expired(1_000_000, 0).await.unwrap(), 1);
        assert!(store
            .get_by_uri("lookup/records/stale")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn subscriptions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let spec = SubscriptionSpec {
            id: "sub-1".to_string(),
            query: Record::from_json(json!({"type": "service"})).unwrap(),
            endpoint: "http://127.0.0.1:9/push".to_string(),
            max_push_events: Some(2),
            time_interval_secs: Some(30),
        };
        {
            let store = open_store(&dir);
            store.save(&spec).unwrap();
        }

        let store = open_store(&dir);
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "sub-1");
        assert_eq!(loaded[0].max_push_events, Some(2));

        store.remove("sub-1").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
