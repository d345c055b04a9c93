#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `workers` is the name-keyed dispatch table the request server consults for
//! every incoming message: a [`WorkerRegistry`] maps a `msg` field value to
//! the handler that knows how to run it, and the four built-in handlers
//! (`ping`, `wait`, `stat`, `cksum`) live here alongside it.
//!
//! # Design
//!
//! Every handler is spawned as its own [`tokio::task`] the moment it is
//! dispatched and returns a [`WorkerHandle`] (a `JoinHandle<Response>`)
//! immediately; the caller decides how long to wait for it and what to do on
//! timeout. This collapses the "constructor, `start()`, poll `is_ready()`"
//! object lifecycle into a single dispatch call, since a spawned task already
//! *is* a live, pollable unit of work. `ping` differs only in that its body
//! never awaits anything; `wait`, `stat`, and `cksum` each run their blocking
//! object-store work inside [`tokio::task::spawn_blocking`].
//!
//! # Invariants
//!
//! - Registering two handlers under the same name is a configuration error
//!   reported at startup, not a runtime dispatch failure.
//! - Dispatching an unregistered name never panics; it returns
//!   [`DispatchError::UnknownWorker`] for the server to turn into a
//!   sentinel-and-close.
//! - A handler's [`Response`] always carries a `status` of `0` on success and
//!   nonzero on failure; callers branch on that rather than on whether an
//!   `Err` was returned, matching the wire response schema.
//!
//! # Errors
//!
//! [`DispatchError`] covers only registry-level failures (duplicate
//! registration, unknown worker name, a malformed request missing its `msg`
//! field). Everything a handler itself can fail at (bad path, truncation,
//! unsupported algorithm) is reported inside its [`Response`], never as a
//! Rust error, since the wire protocol has no room for an out-of-band failure
//! once a request has been dispatched.
//!
//! # Examples
//!
//! ```
//! use workers::{WorkerRegistry, default_context};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut registry = WorkerRegistry::new();
//! registry.register_defaults();
//! let ctx = Arc::new(default_context());
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let response = runtime.block_on(async {
//!     let handle = registry.dispatch(&ctx, &json!({"msg": "ping"})).unwrap();
//!     handle.await.unwrap()
//! });
//! assert_eq!(response.status, 0);
//! ```

mod context;
mod handlers;
mod registry;

pub use context::{WorkerContext, default_context};
pub use registry::{DispatchError, Response, WorkerHandle, WorkerRegistry};
