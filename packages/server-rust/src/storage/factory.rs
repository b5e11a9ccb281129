//! Backend selection: builds the wired record and subscription stores
//! from configuration.
//!
//! Swapping persistence is a configuration concern, not a code change:
//! the factory returns trait objects and the rest of the server never
//! names a concrete backend.

use std::sync::Arc;

use crate::service::config::{ServerConfig, StorageBackend};
use crate::storage::events::RecordObserver;
use crate::storage::memory::MemoryStore;
use crate::storage::store::RecordStore;
use crate::subscription::{MemorySubscriptionStore, SubscriptionStore};

/// Builds the record store and the subscription store for the configured
/// backend, both wired to the given observer chain.
///
/// With the `memory` backend, subscriptions live in process memory and do
/// not survive restart; the `redb` backend persists both.
///
/// # Errors
///
/// Returns an error if the persistent backend cannot be opened, or if a
/// persistent backend is requested without the `redb` feature.
pub fn build_stores(
    config: &ServerConfig,
    observer: Arc<dyn RecordObserver>,
) -> anyhow::Result<(Arc<dyn RecordStore>, Arc<dyn SubscriptionStore>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(observer));
            let subs: Arc<dyn SubscriptionStore> = Arc::new(MemorySubscriptionStore::default());
            Ok((store, subs))
        }
        #[cfg(feature = "redb")]
        StorageBackend::Redb => {
            let path = config.storage.data_dir.join("slookup.redb");
            std::fs::create_dir_all(&config.storage.data_dir)?;
            let store = Arc::new(crate::storage::persistent::RedbStore::open(
                &path, observer,
            )?);
            Ok((
                Arc::clone(&store) as Arc<dyn RecordStore>,
                store as Arc<dyn SubscriptionStore>,
            ))
        }
        #[cfg(not(feature = "redb"))]
        StorageBackend::Redb => anyhow::bail!(
            "persistent storage requested but this build lacks the `redb` feature"
        ),
    }
}
