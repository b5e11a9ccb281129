//! Server configuration.
//!
//! Loadable from a TOML file; every field has a default so a bare
//! `slookupd` run works out of the box. Interval and timeout fields are
//! plain millisecond/second integers to keep the file format obvious.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Which record-store backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory only; nothing survives restart.
    #[default]
    Memory,
    /// redb-backed persistent store (requires the `redb` feature).
    Redb,
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Directory holding the persistent database file.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Lease admission bounds and TTL defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Total lease capacity. `0` means unlimited.
    pub capacity: usize,
    /// TTL applied to records that carry none, in seconds.
    pub default_ttl_secs: u64,
    /// Upper bound on any granted TTL, in seconds.
    pub max_ttl_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            default_ttl_secs: 3_600,
            max_ttl_secs: 7 * 24 * 3_600,
        }
    }
}

impl LeaseConfig {
    /// Default TTL as a duration.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Maximum TTL as a duration.
    #[must_use]
    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}

/// Subscription fan-out and delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Queue size that triggers an immediate flush, unless the
    /// subscription overrides it.
    pub max_push_events: usize,
    /// Time-based flush interval in seconds, unless overridden.
    pub time_interval_secs: u64,
    /// Per-attempt delivery timeout in seconds.
    pub push_timeout_secs: u64,
    /// Consecutive delivery failures before a subscription is retired.
    pub max_consecutive_failures: u32,
    /// Concurrent flush deliveries across all subscriptions.
    pub flush_concurrency: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_push_events: 10,
            time_interval_secs: 60,
            push_timeout_secs: 8,
            max_consecutive_failures: 3,
            flush_concurrency: 8,
        }
    }
}

/// Maintenance cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between prune sweeps, in milliseconds.
    pub prune_interval_ms: u64,
    /// Grace period added to a record's expiry before pruning, in
    /// milliseconds.
    pub prune_threshold_ms: u64,
    /// Interval between time-driven subscription flush sweeps.
    pub flush_interval_ms: u64,
    /// Interval between memory-hygiene passes.
    pub hygiene_interval_ms: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            prune_interval_ms: 30_000,
            prune_threshold_ms: 5_000,
            flush_interval_ms: 1_000,
            hygiene_interval_ms: 60_000,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name of this cache instance, reported in health output.
    pub cache_name: String,
    /// Leases.
    pub lease: LeaseConfig,
    /// Subscriptions.
    pub subscription: SubscriptionConfig,
    /// Maintenance.
    pub maintenance: MaintenanceConfig,
    /// Storage backend.
    pub storage: StorageConfig,
    /// Prometheus exporter port; `None` disables the exporter.
    pub metrics_port: Option<u16>,
}

impl ServerConfig {
    /// URI stamped onto a newly registered record.
    #[must_use]
    pub fn record_uri(&self, id: &str) -> String {
        format!("lookup/records/{id}")
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads `slookup.toml` from a config directory, or defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if a present file fails to parse.
    pub fn load_dir(config_dir: &Path) -> anyhow::Result<Self> {
        let path = config_dir.join("slookup.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
