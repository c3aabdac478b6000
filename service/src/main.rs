//! Firesync service binary.
//!
//! Wires the datastore and the propagation topic to the engine and
//! serves the CloudEvent intake until told to stop.

use anyhow::{Context, Result};
use clap::Parser;
use firesync_datastore::MemoryDatastore;
use firesync_propagator::transport::local::LocalTopic;
use firesync_propagator::{PropagationMetrics, Propagator, PropagatorConfig};
use firesync_service::{build_router, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(false)
        .compact()
        .init();

    info!(
        source = %config.source(),
        topic = config.topic_id(),
        region = config.region,
        instance_id = config.instance_id,
        revision = config.revision,
        configuration = config.configuration,
        "firesync starting"
    );

    let datastore = Arc::new(MemoryDatastore::new());
    let topic = Arc::new(LocalTopic::default());
    let metrics = Arc::new(PropagationMetrics::new());
    let propagator = Arc::new(Propagator::new(
        datastore,
        topic,
        PropagatorConfig {
            source: config.source(),
            tombstone_ttl: config.tombstone_ttl_chrono(),
        },
        metrics,
    ));

    let app = build_router(AppState {
        propagator,
        force_http200_ack: config.force_http200_ack,
    })
    .layer(TraceLayer::new_for_http())
    .layer(TimeoutLayer::new(config.request_timeout));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(port = config.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(config.shutdown_timeout))
        .await
        .context("server failed")?;

    info!("firesync stopped");
    Ok(())
}

/// Resolves when SIGTERM or ctrl-c arrives, then arms a watchdog that
/// hard-stops the process if draining outlives the configured timeout.
async fn shutdown(drain_timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining");
    tokio::spawn(async move {
        tokio::time::sleep(drain_timeout).await;
        warn!("graceful shutdown timed out");
        std::process::exit(1);
    });
}
