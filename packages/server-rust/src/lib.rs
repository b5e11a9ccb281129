//! `slookup` Server -- lease-managed record registry with structured
//! queries, subscription fan-out, and an axum HTTP surface.

pub mod lease;
pub mod maintenance;
pub mod network;
pub mod query;
pub mod service;
pub mod storage;
pub mod subscription;

pub use lease::{Clock, LeaseManager, SystemClock};
pub use maintenance::MaintenanceScheduler;
pub use network::{NetworkConfig, NetworkModule};
pub use query::QueryEngine;
pub use service::{
    AppContext, Authorizer, EditService, ManagedService, QueryService, RegistrationService,
    ServerConfig, ServiceContext, ServiceRegistry, TokenAuthorizer,
};
pub use storage::{RecordStore, StoreError};
pub use subscription::{PushClient, SubscriptionManager, SubscriptionSpec};
