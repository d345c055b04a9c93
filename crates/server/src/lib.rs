#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `server` accepts TCP connections, authenticates each one, dispatches its
//! single request into [`workers`], and runs the keep-alive/timeout
//! bookkeeping while the worker completes.
//!
//! # Design
//!
//! Each connection is handled by its own `tokio` task running the state
//! machine in `connection::handle_connection`: `AUTH` → `RECV` → `DISPATCH` →
//! `WAIT` → `REPLY`/`TIMEOUT_REPLY` → `CLOSE`. Every connection is
//! independent; a panic, timeout, or broken pipe on one never affects
//! another, since nothing is shared across connection tasks except the
//! read-only [`workers::WorkerRegistry`] and [`workers::WorkerContext`].
//!
//! # Invariants
//!
//! - A connection never sends a framed message before authentication
//!   completes, and never sends more than one terminal `response` frame.
//! - The sentinel (end-of-stream) frame is always the last thing written to
//!   a connection that reaches `CLOSE`, and is never written to a connection
//!   that was `ABANDON`ed after a broken pipe.
//! - The per-request deadline is measured from the moment a worker is
//!   dispatched, not from when the connection was accepted.
//!
//! # Errors
//!
//! [`RequestServer::serve`] only returns an `Err` if the listener itself
//! fails (for example, `accept` returning an I/O error); failures within a
//! single connection are logged and end that connection, never the server.
//!
//! # Examples
//!
//! ```no_run
//! # async fn run() -> std::io::Result<()> {
//! use server::{RequestServer, ServerConfig};
//! use workers::{WorkerContext, WorkerRegistry, default_context};
//! use std::time::Duration;
//!
//! let mut registry = WorkerRegistry::new();
//! registry.register_defaults();
//! let context = default_context();
//! let config = ServerConfig::new(b"shared-secret".to_vec(), Duration::from_secs(30));
//!
//! let server = std::sync::Arc::new(RequestServer::new(registry, context, config));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:6000").await?;
//! server.serve(listener).await
//! # }
//! ```

mod connection;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use workers::{WorkerContext, WorkerRegistry};

/// Configuration a [`RequestServer`] needs beyond the registry and context:
/// the shared authentication secret and the per-request deadline.
pub struct ServerConfig {
    secret: Vec<u8>,
    request_deadline: Duration,
}

impl ServerConfig {
    /// Builds a configuration from the shared HMAC secret and the
    /// wall-clock deadline measured from dispatch.
    #[must_use]
    pub const fn new(secret: Vec<u8>, request_deadline: Duration) -> Self {
        Self { secret, request_deadline }
    }
}

/// Accepts connections and runs each one through the authenticate-dispatch-wait
/// state machine.
pub struct RequestServer {
    registry: WorkerRegistry,
    context: Arc<WorkerContext>,
    config: ServerConfig,
}

impl RequestServer {
    /// Builds a server over an already-populated registry, a shared worker
    /// context, and connection-level configuration.
    #[must_use]
    pub fn new(registry: WorkerRegistry, context: WorkerContext, config: ServerConfig) -> Self {
        Self {
            registry,
            context: Arc::new(context),
            config,
        }
    }

    /// Serves connections from `listener` until accepting one fails.
    ///
    /// Each accepted connection is handled on its own task; this method
    /// never returns `Ok` on its own, only `Err` if `accept` itself fails.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from a failed `accept` call.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::info!(%peer, "accepted connection");

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                connection::handle_connection(stream, &server.registry, &server.context, &server.config.secret, server.config.request_deadline).await;
            });
        }
    }
}
