//! Lease manager: admission control and TTL bookkeeping.
//!
//! One lease per live record URI. Admission enforces the configured
//! total-lease capacity; renewal replaces the existing lease without
//! consuming a new slot. The index pairs a URI map with a by-expiry
//! ordering so the next expiry is an O(log n) lookup. A maintenance-tick
//! sweep reconciles the index against the store (and restores leases
//! after a restart of a persistent backend).

pub mod clock;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use slookup_core::{Record, RegistryError};
use tracing::debug;

pub use self::clock::{Clock, ManualClock, SystemClock};

/// URI -> expiry index plus the expiry-ordered view.
///
/// Protected by one exclusive lock; hold time is bounded to index
/// mutation.
#[derive(Default)]
struct LeaseIndex {
    by_uri: HashMap<String, i64>,
    by_expiry: BTreeSet<(i64, String)>,
}

impl LeaseIndex {
    fn insert(&mut self, uri: String, expires_ms: i64) {
        if let Some(old) = self.by_uri.insert(uri.clone(), expires_ms) {
            self.by_expiry.remove(&(old, uri.clone()));
        }
        self.by_expiry.insert((expires_ms, uri));
    }

    fn remove(&mut self, uri: &str) {
        if let Some(expires) = self.by_uri.remove(uri) {
            self.by_expiry.remove(&(expires, uri.to_string()));
        }
    }
}

/// Admission control and TTL bookkeeping for live records.
pub struct LeaseManager {
    /// Total lease capacity; `0` means unlimited.
    capacity: usize,
    /// Applied when a record carries no TTL.
    default_ttl: Duration,
    /// Upper bound on any granted TTL.
    max_ttl: Duration,
    index: parking_lot::Mutex<LeaseIndex>,
    clock: Arc<dyn Clock>,
}

impl LeaseManager {
    /// Creates a manager with the given bounds and time source.
    #[must_use]
    pub fn new(
        capacity: usize,
        default_ttl: Duration,
        max_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            capacity,
            default_ttl,
            max_ttl,
            index: parking_lot::Mutex::new(LeaseIndex::default()),
            clock,
        }
    }

    /// Requests (or renews) a lease for the record.
    ///
    /// On grant, stamps `record-expires` with `now + TTL` (the record's
    /// own TTL capped at the configured maximum, or the default when
    /// absent) and returns `true`. Returns `false` without side effect
    /// when admission would exceed capacity. Renewing a URI that already
    /// holds a lease replaces it and never counts against capacity.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` if the record carries an unparseable TTL, or no URI.
    pub fn request_lease(&self, record: &mut Record) -> Result<bool, RegistryError> {
        let uri = record
            .uri()
            .ok_or_else(|| RegistryError::BadRequest("lease request without a URI".to_string()))?
            .to_string();

        let ttl = record
            .ttl()
            .map_err(RegistryError::from)?
            .unwrap_or(self.default_ttl)
            .min(self.max_ttl);
        let ttl_ms = i64::try_from(ttl.as_millis())
            .map_err(|_| RegistryError::BadRequest("TTL out of range".to_string()))?;
        let expires_ms = self.clock.now_ms().saturating_add(ttl_ms);

        let mut index = self.index.lock();
        let renewal = index.by_uri.contains_key(&uri);
        if !renewal && self.capacity > 0 && index.by_uri.len() >= self.capacity {
            debug!(uri, capacity = self.capacity, "lease denied: capacity exhausted");
            return Ok(false);
        }
        index.insert(uri, expires_ms);
        drop(index);

        record.set_expires_at_ms(expires_ms);
        Ok(true)
    }

    /// Releases a lease. Idempotent: releasing an unknown URI is a no-op.
    pub fn release(&self, uri: &str) {
        self.index.lock().remove(uri);
    }

    /// Number of currently held leases.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.index.lock().by_uri.len()
    }

    /// The earliest `(expires_ms, uri)` pair, if any lease is held.
    #[must_use]
    pub fn next_expiry(&self) -> Option<(i64, String)> {
        self.index.lock().by_expiry.first().cloned()
    }

    /// Expiry stamp held for a URI.
    #[must_use]
    pub fn expires_at(&self, uri: &str) -> Option<i64> {
        self.index.lock().by_uri.get(uri).copied()
    }

    /// Reconciles the index against the live store's `(uri, expires)` view.
    ///
    /// Leases for URIs no longer in the store are dropped; store records
    /// without a lease get one restored from their own expiry stamp (a
    /// record with no stamp gets `now + default_ttl`). Returns
    /// `(dropped, restored)` counts.
    pub fn reconcile<I>(&self, live: I) -> (usize, usize)
    where
        I: IntoIterator<Item = (String, Option<i64>)>,
    {
        let now = self.clock.now_ms();
        #[allow(clippy::cast_possible_truncation)]
        let fallback = now.saturating_add(self.default_ttl.as_millis() as i64);

        let mut index = self.index.lock();
        let mut live_uris = HashSet::new();
        let mut restored = 0;
        for (uri, expires) in live {
            if !index.by_uri.contains_key(&uri) {
                index.insert(uri.clone(), expires.unwrap_or(fallback));
                restored += 1;
            }
            live_uris.insert(uri);
        }

        let stale: Vec<String> = index
            .by_uri
            .keys()
            .filter(|uri| !live_uris.contains(*uri))
            .cloned()
            .collect();
        let dropped = stale.len();
        for uri in stale {
            index.remove(&uri);
        }

        if dropped > 0 || restored > 0 {
            debug!(dropped, restored, "lease reconciliation sweep");
        }
        (dropped, restored)
    }
}
