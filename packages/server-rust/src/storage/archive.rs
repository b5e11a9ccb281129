//! Archive view of historical and tombstoned records.
//!
//! An observer on the live store's commit chain upserts the latest
//! snapshot of every record -- including terminal `DELETE` / `EXPIRED`
//! states -- keyed by URI. The archive answers the read-only archive
//! namespace with the same matcher/skip/limit shape as the live store.

use std::sync::Arc;

use dashmap::DashMap;
use slookup_core::{Record, RecordMatcher};

use super::events::{RecordEvent, RecordObserver};
use super::store::page;

/// In-memory archive: latest snapshot per URI, ordered by last commit.
#[derive(Default)]
pub struct ArchiveStore {
    entries: DashMap<String, (u64, Record)>,
}

impl ArchiveStore {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the snapshot carried by a commit event.
    pub fn absorb(&self, event: &RecordEvent) {
        self.entries
            .insert(event.uri.clone(), (event.seq, event.record.clone()));
    }

    /// Latest archived snapshot for a URI.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Record> {
        self.entries.get(uri).map(|entry| entry.1.clone())
    }

    /// Runs a matcher over the archive with skip/limit paging.
    #[must_use]
    pub fn query(&self, matcher: &RecordMatcher, skip: usize, limit: usize) -> Vec<Record> {
        let mut matches: Vec<(u64, Record)> = self
            .entries
            .iter()
            .filter(|entry| matcher.matches(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_unstable_by_key(|(seq, _)| *seq);
        page(matches.into_iter().map(|(_, r)| r).collect(), skip, limit)
    }

    /// Number of archived URIs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Observer feeding the archive from the live store's commit chain.
pub struct ArchiveObserver {
    archive: Arc<ArchiveStore>,
}

impl ArchiveObserver {
    /// Creates an observer writing into `archive`.
    #[must_use]
    pub fn new(archive: Arc<ArchiveStore>) -> Self {
        Self { archive }
    }
}

impl RecordObserver for ArchiveObserver {
    fn on_committed(&self, event: &RecordEvent) {
        self.archive.absorb(event);
    }
}
