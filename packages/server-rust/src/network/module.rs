//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves.
//! The split lets the bootstrap start background services between
//! binding the port and accepting the first request.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::service::context::AppContext;

use super::config::NetworkConfig;
use super::handlers::{
    archive_not_supported_handler, archive_query_handler, delete_record_handler,
    get_record_handler, health_handler, liveness_handler, query_live_handler,
    readiness_handler, register_handler, renew_record_handler, subscribe_handler,
    unsubscribe_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    ctx: Arc<AppContext>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, ctx: Arc<AppContext>) -> Self {
        Self {
            config,
            ctx,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared shutdown controller, for signal wiring and probes.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router with all routes and middleware.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/lookup/records", post(register_handler).get(query_live_handler))
            .route(
                "/lookup/records/{id}",
                get(get_record_handler)
                    .post(renew_record_handler)
                    .delete(delete_record_handler),
            )
            .route("/lookup/subscribe", post(subscribe_handler))
            .route("/lookup/subscribe/{id}", axum::routing::delete(unsubscribe_handler))
            .route(
                "/lookup/services/archive",
                get(archive_query_handler)
                    .post(archive_not_supported_handler)
                    .delete(archive_not_supported_handler),
            )
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener; returns the actual bound port (which may
    /// differ from the configured one when port 0 is used).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = self.config.host, port, "TCP listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains.
    ///
    /// # Errors
    ///
    /// Returns an error on a fatal IO failure, or if `start()` was not
    /// called first.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);

        controller.set_ready();
        info!("serving HTTP connections");

        let drain = {
            let controller = Arc::clone(&controller);
            async move {
                shutdown.await;
                controller.trigger();
            }
        };
        axum::serve(listener, router)
            .with_graceful_shutdown(drain)
            .await?;

        controller.set_stopped();
        info!("all connections drained");
        Ok(())
    }
}
