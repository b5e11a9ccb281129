//! `slookupd` -- Simple Lookup Service cache daemon.
//!
//! Exit codes: 0 on normal shutdown, 1 on fatal bootstrap failure,
//! 2 on bad command-line arguments (clap's convention).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slookup_server::lease::SystemClock;
use slookup_server::network::{NetworkConfig, NetworkModule};
use slookup_server::service::registry::ServiceContext;
use slookup_server::service::{AppContext, ServerConfig, TokenAuthorizer};
use slookup_server::subscription::HttpPushClient;

#[derive(Debug, Parser)]
#[command(name = "slookupd", version, about = "Simple Lookup Service cache daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "SLOOKUP_HOST")]
    host: String,

    /// Listen port. 0 means OS-assigned.
    #[arg(long, default_value_t = 8090, env = "SLOOKUP_PORT")]
    port: u16,

    /// Directory containing `slookup.toml`.
    #[arg(long, default_value = "/etc/slookup", env = "SLOOKUP_CONFIG_DIR")]
    config_dir: PathBuf,

    /// Log filter, in tracing `EnvFilter` syntax (e.g. `info`,
    /// `slookup_server=debug`).
    #[arg(long, default_value = "info", env = "SLOOKUP_LOG")]
    log: String,

    /// Data directory for the persistent backend; overrides the config
    /// file.
    #[arg(long, env = "SLOOKUP_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal bootstrap failure");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = ServerConfig::load_dir(&args.config_dir)?;
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()?;
        info!(port, "prometheus exporter listening");
    }

    let push = Arc::new(HttpPushClient::new(Duration::from_secs(
        config.subscription.push_timeout_secs,
    ))?);
    let (ctx, registry) = AppContext::build(
        config,
        push,
        Arc::new(TokenAuthorizer),
        Arc::new(SystemClock),
    )
    .await?;

    let svc_ctx = ServiceContext {
        config: Arc::clone(&ctx.config),
    };
    registry.init_all(&svc_ctx).await?;

    let net_config = NetworkConfig {
        host: args.host,
        port: args.port,
        ..NetworkConfig::default()
    };
    let mut network = NetworkModule::new(net_config, Arc::clone(&ctx));
    network.start().await?;

    network
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    registry.shutdown_all().await?;
    info!("shutdown complete");
    Ok(())
}
