//! ingress-auth
//!
//! External authorization service answering auth subrequests from a reverse
//! proxy or ingress controller.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                   INGRESS-AUTH                    │
//!                          │                                                   │
//!   Auth subrequest        │  ┌─────────┐   ┌─────────┐   ┌──────────────┐     │
//!   ───────────────────────┼─▶│  http   │──▶│ context │──▶│    rules     │     │
//!                          │  │ server  │   │ resolve │   │    engine    │     │
//!                          │  └─────────┘   └─────────┘   └──────┬───────┘     │
//!                          │                                     │ restrict    │
//!                          │                                     ▼             │
//!                          │                 ┌─────────────┐   ┌───────────┐   │
//!                          │                 │ brute_force │◀─▶│   auth    │   │
//!                          │                 │   tracker   │   │ + cache   │──┼──▶ htpasswd / LDAP
//!                          │                 └─────────────┘   └───────────┘   │
//!   200/401/403/429        │  ┌──────────┐                                     │
//!   ◀──────────────────────┼──│ response │◀── decision                         │
//!   + X-User / X-Groups    │  └──────────┘                                     │
//!                          │                                                   │
//!                          │  config · observability · lifecycle · health      │
//!                          └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use ingress_auth::clock;
use ingress_auth::config::load_config;
use ingress_auth::http::HttpServer;
use ingress_auth::lifecycle::{signals, startup, Shutdown};
use ingress_auth::observability::{logging, metrics};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "ingress-auth")]
#[command(about = "External authorization service for ingress auth subrequests", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long, env = "INGRESS_AUTH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ingress-auth starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        auth_cache_ttl_secs = config.auth_cache.ttl_secs,
        rules_path = %config.rules.path,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.metrics.address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let pipeline = match startup::build_pipeline(&config, clock::system()) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    let sweeper = startup::spawn_sweeper(pipeline.clone(), SWEEP_INTERVAL, shutdown.subscribe());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(pipeline, &config.listener);
    server.run(listener, shutdown.subscribe()).await?;

    let _ = sweeper.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
