//! Background Expiry Sweeper
//!
//! Reads never return an expired entry, so correctness does not depend on
//! this task. It only reclaims memory held by keys nobody reads again.
//!
//! Every `interval` the sweeper calls [`StorageEngine::cleanup_expired`],
//! which scans one shard at a time; foreground operations wait at most for a
//! single shard's removal pass.

use crate::storage::StorageEngine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between two sweeps
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Handle to the running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    sweeps: Arc<AtomicU64>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    ///
    /// ```ignore
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&engine), ExpiryConfig::default());
    /// // keep `sweeper` alive for as long as the server runs
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeps = Arc::new(AtomicU64::new(0));

        info!(
            interval_secs = config.interval.as_secs_f64(),
            "Background expiry sweeper started"
        );
        let task = tokio::spawn(run_sweeps(
            engine,
            config.interval,
            Arc::clone(&sweeps),
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            task: Some(task),
            sweeps,
        }
    }

    /// Number of sweeps completed so far.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Signals the task to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the task and waits until it has exited.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_sweeps(
    engine: Arc<StorageEngine>,
    period: Duration,
    sweeps: Arc<AtomicU64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first sweep waits a full period
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper stopping");
                    return;
                }
                continue;
            }
        }

        let removed = engine.cleanup_expired();
        sweeps.fetch_add(1, Ordering::Relaxed);

        if removed == 0 {
            trace!("Expiry sweep removed nothing");
        } else {
            debug!(removed, remaining = engine.len(), "Expiry sweep reclaimed keys");
        }
    }
}
