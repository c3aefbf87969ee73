//! evgate gateway server.
//!
//! Terminates GB/T 32960 terminal connections and forwards decoded telemetry
//! to the configured data sink.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evgate_core::auth::AuthService;
use evgate_core::config::{Config, SinkMode};
use evgate_core::dispatch::Dispatcher;
use evgate_core::handler::ProtocolHandler;
use evgate_core::server::GatewayServer;
use evgate_core::session::SessionManager;
use evgate_core::sink::{DataSink, LogSink, NoopSink};

/// GB/T 32960 telematics gateway
#[derive(Parser)]
#[command(name = "evgate-server")]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "configs/gateway.toml")]
    config: String,

    /// Listen address override (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_sink(config: &Config) -> Result<Arc<dyn DataSink>> {
    match config.sink.mode {
        SinkMode::None => {
            info!("sink disabled, records will be discarded");
            Ok(Arc::new(NoopSink))
        }
        SinkMode::Log => Ok(Arc::new(LogSink)),
        SinkMode::Kafka | SinkMode::Rabbitmq => {
            bail!(
                "sink mode {:?} requires an external DataSink driver; \
                 this build ships only 'none' and 'log'",
                config.sink.mode
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %args.config, error = %e, "config not loaded, using defaults");
            Config::default()
        }
    };

    let sink = build_sink(&config)?;
    let dispatcher =
        Dispatcher::start(config.dispatcher.queue_capacity, config.dispatcher.workers, sink);

    let sessions = Arc::new(SessionManager::new());
    let auth = Arc::new(AuthService::new(&config.auth.users));
    let handler =
        Arc::new(ProtocolHandler::new(Arc::clone(&sessions), dispatcher.submitter(), auth));
    let server = GatewayServer::new(handler, config.server.max_packet_size);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_sessions = Arc::clone(&sessions);
    let sweeper_shutdown = shutdown_rx.clone();
    let sweep_interval = config.session.sweep_interval();
    let session_timeout = config.session.timeout();
    let sweeper = tokio::spawn(async move {
        sweeper_sessions.run_sweeper(sweep_interval, session_timeout, sweeper_shutdown).await;
    });

    let listen_addr = args.listen.unwrap_or_else(|| config.server.listen_addr());
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;

    info!(
        address = %listen_addr,
        session_timeout_secs = config.session.timeout_secs,
        workers = config.dispatcher.workers,
        "evgate starting"
    );

    let server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");

    let _ = shutdown_tx.send(true);
    let _ = server_task.await;
    let _ = sweeper.await;
    dispatcher.shutdown().await;

    info!("bye");
    Ok(())
}
