//! replikv-node: entry point for a replicated KV node.
//!
//! Loads config, opens the local store, resolves the cluster topology,
//! wires the replication coordinator over the HTTP transport, then
//! serves the client-facing surface with graceful shutdown.

use replikv_net::{build_router, AppState, HttpReplicaClient};
use replikv_replication::{Coordinator, Dispatcher, Topology};
use replikv_storage::LocalStore;
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    replikv_metrics::init_tracing();

    // Load config: first CLI arg is the YAML config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config =
        replikv_config::load_from_file(std::path::Path::new(&config_path)).unwrap_or_else(|e| {
            tracing::warn!(
                "failed to load config from {}: {}, using defaults",
                config_path,
                e
            );
            // Minimal default: a standalone node on 127.0.0.1:8000
            replikv_config::load_from_str("listen: \"127.0.0.1:8000\"\ntopology: []\n")
                .expect("hardcoded default config must parse")
        });

    let store = Arc::new(LocalStore::open(&config.storage.data_dir)?);

    let topology = Topology::from_cluster(&config.topology, config.listen.port())?;
    tracing::info!(
        peers = topology.peers().len(),
        default_rf = %topology.default_rf(),
        "topology resolved"
    );

    let dispatcher = Arc::new(Dispatcher::new(config.replication.fan_out_permits));
    let client = Arc::new(HttpReplicaClient::new(Duration::from_millis(
        config.replication.request_timeout_ms,
    ))?);
    let coordinator = Coordinator::new(store.clone(), topology, client, dispatcher.clone());
    let app = build_router(Arc::new(AppState { coordinator, store }));

    // Spawn metrics HTTP server if configured
    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr: std::net::SocketAddr = format!("0.0.0.0:{}", metrics_port)
            .parse()
            .expect("valid metrics address");
        tokio::spawn(async move {
            if let Err(e) = replikv_metrics::serve_metrics(metrics_addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("serving HTTP on {}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received Ctrl+C, shutting down");
        })
        .await?;

    // Drain in-flight fan-out batches, then force-cancel the rest.
    dispatcher
        .shutdown(Duration::from_millis(config.replication.shutdown_grace_ms))
        .await;

    Ok(())
}
