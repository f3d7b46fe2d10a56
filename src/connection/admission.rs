//! Connection Admission Control
//!
//! Bounds how many connections are served at once. A new connection is
//! served immediately when a slot is free, parked in a bounded FIFO queue
//! when none is, and rejected (closed without a reply) when the queue is
//! full too. A promotion task moves queued connections into service as
//! slots free up.
//!
//! ```text
//!              accept()
//!                 │
//!                 ▼
//!      active < max_connections ? ──yes──> Serve (slot taken)
//!                 │ no
//!                 ▼
//!      pending < queue_capacity ? ──yes──> Queued ──(slot freed)──> Serve
//!                 │ no
//!                 ▼
//!              Rejected (socket dropped)
//! ```
//!
//! The controller is generic over the connection type so the policy can be
//! exercised without sockets.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::trace;

/// Default maximum number of concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Default capacity of the pending-connection queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Admission limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub max_connections: usize,
    pub queue_capacity: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Outcome of [`AdmissionController::admit`].
#[derive(Debug)]
pub enum Admission<T> {
    /// Serve now; the slot is released when the guard drops.
    Serve(T, SlotGuard<T>),
    /// Parked until a slot frees up.
    Queued,
    /// No slot and no queue space; the caller should drop the connection.
    Rejected(T),
}

#[derive(Debug)]
struct AdmissionState<T> {
    active: usize,
    pending: VecDeque<T>,
}

/// Tracks served and pending connections under a single lock.
#[derive(Debug)]
pub struct AdmissionController<T> {
    config: AdmissionConfig,
    state: Mutex<AdmissionState<T>>,
    /// Signalled whenever promotion might be possible
    wakeup: Notify,
}

impl<T> AdmissionController<T> {
    pub fn new(config: AdmissionConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(AdmissionState {
                active: 0,
                pending: VecDeque::with_capacity(config.queue_capacity),
            }),
            wakeup: Notify::new(),
        })
    }

    pub fn config(&self) -> AdmissionConfig {
        self.config
    }

    // The state is two plain fields updated together; a panic elsewhere
    // cannot leave them half-written
    fn lock(&self) -> MutexGuard<'_, AdmissionState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of connections currently being served.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Number of connections waiting in the queue.
    pub fn queued(&self) -> usize {
        self.lock().pending.len()
    }

    /// Decides what happens to a newly accepted connection.
    pub fn admit(self: &Arc<Self>, conn: T) -> Admission<T> {
        let mut state = self.lock();

        if state.active < self.config.max_connections {
            state.active += 1;
            drop(state);
            return Admission::Serve(conn, SlotGuard::new(Arc::clone(self)));
        }

        if state.pending.len() < self.config.queue_capacity {
            state.pending.push_back(conn);
            drop(state);
            self.wakeup.notify_one();
            return Admission::Queued;
        }

        Admission::Rejected(conn)
    }

    /// Takes a slot for the oldest queued connection, if both exist.
    pub fn try_promote(self: &Arc<Self>) -> Option<(T, SlotGuard<T>)> {
        let mut state = self.lock();

        if state.active >= self.config.max_connections {
            return None;
        }
        let conn = state.pending.pop_front()?;
        state.active += 1;
        drop(state);

        Some((conn, SlotGuard::new(Arc::clone(self))))
    }

    /// Waits until a queued connection can be served and returns it.
    ///
    /// Meant to be awaited by a single promotion task in a loop.
    pub async fn next_promotion(self: &Arc<Self>) -> (T, SlotGuard<T>) {
        loop {
            // Register interest before checking so a release between the
            // check and the await is not missed
            let notified = self.wakeup.notified();
            if let Some(promoted) = self.try_promote() {
                return promoted;
            }
            notified.await;
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        let has_pending = !state.pending.is_empty();
        drop(state);

        trace!(has_pending, "Connection slot released");
        if has_pending {
            self.wakeup.notify_one();
        }
    }
}

/// Holds one serving slot; releases it when dropped.
#[derive(Debug)]
pub struct SlotGuard<T> {
    controller: Arc<AdmissionController<T>>,
}

impl<T> SlotGuard<T> {
    fn new(controller: Arc<AdmissionController<T>>) -> Self {
        Self { controller }
    }
}

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        self.controller.release();
    }
}
