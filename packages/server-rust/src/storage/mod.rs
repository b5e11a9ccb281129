//! Storage layer for the lookup server.
//!
//! - [`store`]: the [`RecordStore`] contract every backend honors
//! - [`events`]: commit events and the observer chain
//! - [`memory`]: in-memory backend (default)
//! - [`persistent`]: redb-backed durable backend (feature `redb`)
//! - [`archive`]: read-only view of historical/tombstoned records
//! - [`factory`]: backend selection from configuration

pub mod archive;
pub mod events;
pub mod factory;
pub mod memory;
#[cfg(feature = "redb")]
pub mod persistent;
pub mod store;

pub use archive::{ArchiveObserver, ArchiveStore};
pub use events::{CompositeObserver, MetricsObserver, NullObserver, RecordEvent, RecordObserver};
pub use factory::build_stores;
pub use memory::MemoryStore;
#[cfg(feature = "redb")]
pub use persistent::RedbStore;
pub use store::{page, RecordStore, StoreError};
