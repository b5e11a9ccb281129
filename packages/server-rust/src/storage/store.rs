//! Record store contract.
//!
//! Defines [`RecordStore`], the abstract keyed collection every backend
//! must honor: insert, lookup by identity, structured query, update,
//! delete, and expiry pruning. Implementations serialize conflicting
//! writes internally and emit a commit event for every mutation (see
//! [`super::events`]), which is how per-URI linearization reaches the
//! subscription fan-out.

use async_trait::async_trait;
use slookup_core::{Record, RecordMatcher, RegistryError};
use thiserror::Error;

/// Errors surfaced by [`RecordStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Insert hit an already-present URI.
    #[error("record `{0}` already exists")]
    Duplicate(String),
    /// Update targeted an absent URI.
    #[error("record `{0}` not found")]
    NotFound(String),
    /// The backend itself failed (IO, corruption, serialization).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(uri) => Self::NotFound(uri),
            StoreError::Duplicate(_) | StoreError::Backend(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Abstract keyed collection of live records.
///
/// All operations are individually atomic; there are no cross-operation
/// transactions. Query ordering is commit order, which is stable across
/// consecutive identical queries while the store is not mutated.
///
/// Used as `Arc<dyn RecordStore>`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a record under its stamped URI.
    ///
    /// The caller assigns the URI before inserting. Returns the stored
    /// record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if the URI is already present.
    async fn insert(&self, record: Record) -> Result<Record, StoreError>;

    /// Fetches a record by URI, `None` if absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    async fn get_by_uri(&self, uri: &str) -> Result<Option<Record>, StoreError>;

    /// Atomically replaces the record stored under `uri`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the URI is absent.
    async fn update(&self, uri: &str, record: Record) -> Result<Record, StoreError>;

    /// Atomic remove-and-return. `None` if the URI was absent.
    ///
    /// The returned record is stamped `DELETE`, matching the event the
    /// removal emitted.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    async fn delete(&self, uri: &str) -> Result<Option<Record>, StoreError>;

    /// Runs a compiled matcher over the store.
    ///
    /// `skip` drops the first n matches in commit order; `limit == 0`
    /// means unlimited.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    async fn query(
        &self,
        matcher: &RecordMatcher,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError>;

    /// Removes every record with `expires-at + threshold < now`.
    ///
    /// Each removal emits an `EXPIRED` commit event. Returns the number
    /// of records pruned.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on backend failure.
    async fn prune_expired(&self, now_ms: i64, threshold_ms: i64) -> Result<u64, StoreError>;

    /// Number of live records.
    async fn count(&self) -> usize;
}

/// Applies skip/limit paging to an already-ordered match list.
///
/// `limit == 0` means unlimited. Guarantees exactly
/// `min(matches - skip, limit)` results when that quantity is
/// non-negative, and an empty list when `skip` exceeds the match count.
#[must_use]
pub fn page<T>(matches: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    let take = if limit == 0 { usize::MAX } else { limit };
    matches.into_iter().skip(skip).take(take).collect()
}
