//! TCP Server
//!
//! Owns the listener, the admission controller and the promotion task.
//!
//! ```text
//!   accept loop ──admit──> Serve ──────────────> spawn session
//!                     └──> Queued ──(promotion task)──> spawn session
//!                     └──> Rejected ──> socket dropped, nothing written
//! ```
//!
//! Every served session holds a [`SlotGuard`] for its whole lifetime, so a
//! slot frees up exactly when the session task ends, however it ends.

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{
    handle_connection, Admission, AdmissionController, ConnectionContext, ConnectionStats,
    SlotGuard,
};
use crate::protocol::{Authenticator, FrameParser};
use crate::storage::StorageEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// An accepted socket waiting for, or holding, a serving slot.
pub type PendingConnection = (TcpStream, SocketAddr);

/// The cache server.
pub struct Server {
    admission: Arc<AdmissionController<PendingConnection>>,
    ctx: ConnectionContext,
}

impl Server {
    /// Builds a server around a shared storage engine.
    pub fn new(config: &ServerConfig, storage: Arc<StorageEngine>) -> Self {
        let ctx = ConnectionContext {
            command_handler: CommandHandler::new(storage),
            authenticator: Arc::new(Authenticator::new(config.api_key.clone())),
            parser: FrameParser::new(config.frame_limits()),
            pool: config.pool_config(),
            stats: Arc::new(ConnectionStats::new()),
        };

        Self {
            admission: AdmissionController::new(config.admission_config()),
            ctx,
        }
    }

    /// Connection statistics shared by every session.
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.ctx.stats
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        self.ctx.command_handler.storage()
    }

    pub fn admission(&self) -> &Arc<AdmissionController<PendingConnection>> {
        &self.admission
    }

    /// Serves connections until the process exits.
    pub async fn run(&self, listener: TcpListener) {
        self.run_until(listener, std::future::pending::<()>()).await
    }

    /// Serves connections until `shutdown` completes.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let promoter = tokio::spawn(promotion_loop(
            Arc::clone(&self.admission),
            self.ctx.clone(),
        ));

        tokio::select! {
            _ = self.accept_loop(&listener) => {}
            _ = shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
            }
        }

        promoter.abort();
    }

    /// Main loop that accepts incoming connections
    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    self.ctx.stats.connection_accepted();
                    self.admit(stream, addr);
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        match self.admission.admit((stream, addr)) {
            Admission::Serve((stream, addr), slot) => {
                info!(client = %addr, active = self.admission.active(), "Connection accepted");
                spawn_session(stream, addr, slot, self.ctx.clone());
            }
            Admission::Queued => {
                self.ctx.stats.connection_queued();
                info!(
                    client = %addr,
                    queued = self.admission.queued(),
                    "Server busy, connection queued"
                );
            }
            Admission::Rejected((stream, addr)) => {
                self.ctx.stats.connection_rejected();
                warn!(client = %addr, "Server busy and queue full, connection rejected");
                drop(stream);
            }
        }
    }
}

/// Moves queued connections into service as slots free up.
async fn promotion_loop(
    admission: Arc<AdmissionController<PendingConnection>>,
    ctx: ConnectionContext,
) {
    loop {
        let ((stream, addr), slot) = admission.next_promotion().await;
        info!(
            client = %addr,
            queued = admission.queued(),
            "Queued connection promoted"
        );
        spawn_session(stream, addr, slot, ctx.clone());
    }
}

fn spawn_session(
    stream: TcpStream,
    addr: SocketAddr,
    slot: SlotGuard<PendingConnection>,
    ctx: ConnectionContext,
) {
    tokio::spawn(async move {
        handle_connection(stream, addr, ctx).await;
        drop(slot);
        debug!(client = %addr, "Connection slot released");
    });
}
