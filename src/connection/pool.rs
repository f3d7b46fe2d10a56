//! Per-Connection Worker Pool
//!
//! Each served connection owns a small pool of worker tasks fed from a
//! bounded job queue. The connection's reader submits one command, waits for
//! its response, writes it, and only then reads the next command, so
//! responses always go out in request order.
//!
//! ```text
//!  reader ──submit──> [ job queue (bounded) ] ──> worker 1 ─┐
//!     ▲                                        ──> worker 2 ─┼─> CommandHandler
//!     │                                        ──> worker 3 ─┘
//!     └────────────── oneshot reply ◄───────────────────────┘
//! ```
//!
//! Closing the queue ends every worker; [`WorkerPool::shutdown`] waits for
//! them, and dropping the pool aborts any that are still running.

use crate::commands::CommandHandler;
use crate::protocol::{Command, Response};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::trace;

/// Default number of workers per connection.
pub const DEFAULT_WORKERS: usize = 3;

/// Default capacity of the per-connection job queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 3;

/// Sizing of a connection's worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker tasks (at least one)
    pub workers: usize,
    /// Capacity of the job queue (at least one)
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// The pool stopped before it produced a response.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("worker pool closed")]
pub struct PoolClosed;

struct Job {
    command: Command,
    reply: oneshot::Sender<Response>,
}

/// A fixed set of workers bound to one connection's job queue.
pub struct WorkerPool {
    jobs: Option<mpsc::Sender<Job>>,
    workers: JoinSet<()>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("open", &self.jobs.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns the workers on the current Tokio runtime.
    pub fn spawn(handler: CommandHandler, config: PoolConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for id in 0..config.workers.max(1) {
            workers.spawn(worker_loop(id, handler.clone(), Arc::clone(&rx)));
        }

        Self {
            jobs: Some(tx),
            workers,
        }
    }

    /// Number of worker tasks still running.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues a command and waits for its response.
    pub async fn submit(&self, command: Command) -> Result<Response, PoolClosed> {
        let jobs = self.jobs.as_ref().ok_or(PoolClosed)?;

        let (reply, response) = oneshot::channel();
        jobs.send(Job { command, reply })
            .await
            .map_err(|_| PoolClosed)?;

        response.await.map_err(|_| PoolClosed)
    }

    /// Closes the job queue and waits for every worker to exit.
    pub async fn shutdown(&mut self) {
        self.jobs.take();
        while self.workers.join_next().await.is_some() {}
    }
}

async fn worker_loop(id: usize, handler: CommandHandler, jobs: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // The lock is only held while waiting for the next job
        let job = jobs.lock().await.recv().await;

        let Some(Job { command, reply }) = job else {
            trace!(worker = id, "Job queue closed, worker exiting");
            return;
        };

        trace!(worker = id, command = command.name(), "Executing command");
        let _ = reply.send(handler.execute(command));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use bytes::Bytes;

    fn create_pool(workers: usize) -> (WorkerPool, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));
        let pool = WorkerPool::spawn(
            handler,
            PoolConfig {
                workers,
                queue_depth: 3,
            },
        );
        (pool, storage)
    }

    #[tokio::test]
    async fn test_submit_returns_matching_response() {
        let (pool, _) = create_pool(3);

        for i in 0..50 {
            let key = Bytes::from(format!("key{}", i));
            let value = Bytes::from(format!("value{}", i));

            let response = pool
                .submit(Command::Set {
                    key: key.clone(),
                    value: value.clone(),
                    ttl_secs: 0,
                })
                .await
                .unwrap();
            assert_eq!(response, Response::Ok);

            let response = pool.submit(Command::Get { key }).await.unwrap();
            assert_eq!(response, Response::Value(value));
        }
    }

    #[tokio::test]
    async fn test_pool_writes_shared_store() {
        let (pool, storage) = create_pool(2);

        pool.submit(Command::Set {
            key: Bytes::from("k"),
            value: Bytes::from("v"),
            ttl_secs: 0,
        })
        .await
        .unwrap();

        assert_eq!(storage.get(b"k"), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn test_shutdown_joins_all_workers() {
        let (mut pool, _) = create_pool(3);
        assert_eq!(pool.worker_count(), 3);

        pool.shutdown().await;

        assert_eq!(pool.worker_count(), 0);
        assert_eq!(pool.submit(Command::RemoveAll).await, Err(PoolClosed));
    }

    #[tokio::test]
    async fn test_zero_workers_clamped_to_one() {
        let (pool, _) = create_pool(0);
        assert_eq!(pool.worker_count(), 1);
        assert_eq!(pool.submit(Command::RemoveAll).await, Ok(Response::Ok));
    }

    #[tokio::test]
    async fn test_pools_run_in_parallel() {
        let storage = Arc::new(StorageEngine::new());
        let mut tasks = JoinSet::new();

        for client in 0..8 {
            let handler = CommandHandler::new(Arc::clone(&storage));
            tasks.spawn(async move {
                let mut pool = WorkerPool::spawn(handler, PoolConfig::default());
                for j in 0..25 {
                    let key = Bytes::from(format!("c{}-k{}", client, j));
                    pool.submit(Command::Set {
                        key,
                        value: Bytes::from("v"),
                        ttl_secs: 0,
                    })
                    .await
                    .unwrap();
                }
                pool.shutdown().await;
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }
        assert_eq!(storage.len(), 200);
    }
}
