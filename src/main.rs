//! shardkv server binary.
//!
//! Reads configuration from the environment, sets up the storage engine and
//! its expiry sweeper, and serves connections until Ctrl+C.

use anyhow::Context;
use shardkv::{ExpirySweeper, Server, ServerConfig, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // RUST_LOG takes precedence over the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    info!(version = shardkv::VERSION, config = ?config, "Starting shardkv");

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::with_shards(config.shards));
    info!(shards = storage.shard_count(), "Storage engine initialized");

    // Runs until dropped at the end of main
    let _sweeper = ExpirySweeper::start(Arc::clone(&storage), config.expiry_config());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    let server = Server::new(&config, Arc::clone(&storage));

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    server.run_until(listener, shutdown).await;

    let stats = server.stats();
    let storage_stats = storage.stats();
    info!(
        accepted = stats.connections_accepted.load(Ordering::Relaxed),
        queued = stats.connections_queued.load(Ordering::Relaxed),
        rejected = stats.connections_rejected.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        auth_failures = stats.auth_failures.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Connection statistics"
    );
    info!(
        keys = storage_stats.keys,
        gets = storage_stats.get_ops,
        sets = storage_stats.set_ops,
        dels = storage_stats.del_ops,
        expired = storage_stats.expired,
        "Storage statistics"
    );

    info!("Server shutdown complete");
    Ok(())
}
