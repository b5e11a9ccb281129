//! Service layer: configuration, context, lifecycle, and the three
//! request-path services (registration, edit, query).
//!
//! Handlers receive an explicit [`AppContext`] -- there are no global
//! singletons -- and background subsystems run under the
//! [`ServiceRegistry`] lifecycle.

pub mod auth;
pub mod config;
pub mod context;
pub mod edit;
pub mod query;
pub mod registration;
pub mod registry;

pub use auth::{Authorizer, TokenAuthorizer};
pub use config::{ServerConfig, StorageBackend};
pub use context::AppContext;
pub use edit::EditService;
pub use query::QueryService;
pub use registration::RegistrationService;
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
