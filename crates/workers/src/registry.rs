use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::context::WorkerContext;
use crate::handlers;

/// A worker's reply, matching the wire response schema's `(status, response,
/// error)` triple.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    /// Zero on success, nonzero on failure.
    pub status: u8,
    /// Success payload. Empty when `status != 0`.
    pub response: Map<String, Value>,
    /// Failure payload. Empty when `status == 0`.
    pub error: Map<String, Value>,
}

impl Response {
    /// Builds a success response with the given payload.
    #[must_use]
    pub fn ok(response: Map<String, Value>) -> Self {
        Self {
            status: 0,
            response,
            error: Map::new(),
        }
    }

    /// Builds a failure response carrying a single `"error"` message field.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        let mut error = Map::new();
        error.insert("error".to_string(), Value::String(message.into()));
        Self {
            status: 1,
            response: Map::new(),
            error,
        }
    }
}

/// A dispatched worker's handle: a spawned task that resolves to its
/// [`Response`] once complete.
pub type WorkerHandle = JoinHandle<Response>;

/// Errors raised by the registry itself, as opposed to by a dispatched
/// worker's own logic.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Two handlers were registered under the same name.
    #[error("worker {0:?} is already registered")]
    AlreadyRegistered(String),
    /// The request had no recognized `msg` handler registered for it.
    #[error("worker {0:?} is not registered")]
    UnknownWorker(String),
    /// The request object had no `msg` field at all.
    #[error("request has no \"msg\" field")]
    MissingMessageField,
}

type Handler = Arc<dyn Fn(Arc<WorkerContext>, Value) -> WorkerHandle + Send + Sync>;

/// Name-keyed dispatch table mapping a request's `msg` field to the handler
/// that runs it.
///
/// Registration happens once at startup and is total: a name collision is a
/// configuration error. Dispatch of an unregistered name is an ordinary,
/// non-fatal error the server turns into a closed connection.
#[derive(Default)]
pub struct WorkerRegistry {
    handlers: HashMap<String, Handler>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyRegistered`] if `name` is already taken.
    pub fn register(&mut self, name: &str, handler: Handler) -> Result<(), DispatchError> {
        if self.handlers.contains_key(name) {
            return Err(DispatchError::AlreadyRegistered(name.to_string()));
        }
        tracing::debug!(worker = name, "registering worker");
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Registers the four built-in handlers: `ping`, `wait`, `stat`, `cksum`.
    ///
    /// # Panics
    ///
    /// Panics if called twice on the same registry, since that would
    /// re-register an already-registered name.
    pub fn register_defaults(&mut self) {
        self.register_only(&["ping", "wait", "stat", "cksum"]).expect("default workers register exactly once");
    }

    /// Registers only the named subset of the four built-in handlers,
    /// letting a deployment run a server that answers, say, only `cksum`
    /// requests.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownWorker`] if `names` contains anything
    /// other than `ping`, `wait`, `stat`, or `cksum`.
    pub fn register_only(&mut self, names: &[&str]) -> Result<(), DispatchError> {
        for &name in names {
            match name {
                "ping" => self.register("ping", Arc::new(|_ctx, msg| tokio::spawn(async move { handlers::ping(&msg) })))?,
                "wait" => self.register("wait", Arc::new(|_ctx, msg| tokio::spawn(async move { handlers::wait(&msg).await })))?,
                "stat" => self.register("stat", Arc::new(|ctx, msg| tokio::spawn(async move { handlers::stat(&ctx, &msg).await })))?,
                "cksum" => self.register("cksum", Arc::new(|ctx, msg| tokio::spawn(async move { handlers::cksum(&ctx, &msg).await })))?,
                other => return Err(DispatchError::UnknownWorker(other.to_string())),
            }
        }
        Ok(())
    }

    /// Dispatches `msg` to the handler named by its `"msg"` field, spawning
    /// the handler's task and returning its handle immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingMessageField`] if `msg` has no `"msg"`
    /// field, and [`DispatchError::UnknownWorker`] if no handler is
    /// registered under that name.
    pub fn dispatch(&self, ctx: &Arc<WorkerContext>, msg: &Value) -> Result<WorkerHandle, DispatchError> {
        let name = msg.get("msg").and_then(Value::as_str).ok_or(DispatchError::MissingMessageField)?;

        let handler = self.handlers.get(name).ok_or_else(|| DispatchError::UnknownWorker(name.to_string()))?;

        Ok((handler.as_ref())(Arc::clone(ctx), msg.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::default_context;
    use serde_json::json;

    #[test]
    fn register_defaults_populates_four_workers() {
        let mut registry = WorkerRegistry::new();
        registry.register_defaults();
        assert!(registry.handlers.contains_key("ping"));
        assert!(registry.handlers.contains_key("wait"));
        assert!(registry.handlers.contains_key("stat"));
        assert!(registry.handlers.contains_key("cksum"));
    }

    #[test]
    fn register_only_populates_just_the_requested_subset() {
        let mut registry = WorkerRegistry::new();
        registry.register_only(&["ping", "cksum"]).unwrap();
        assert!(registry.handlers.contains_key("ping"));
        assert!(registry.handlers.contains_key("cksum"));
        assert!(!registry.handlers.contains_key("wait"));
        assert!(!registry.handlers.contains_key("stat"));
    }

    #[test]
    fn register_only_rejects_an_unrecognized_name() {
        let mut registry = WorkerRegistry::new();
        let err = registry.register_only(&["ping", "not-a-worker"]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownWorker(name) if name == "not-a-worker"));
    }

    #[test]
    fn registering_a_duplicate_name_is_an_error() {
        let mut registry = WorkerRegistry::new();
        registry.register("ping", Arc::new(|_c, m| tokio::spawn(async move { handlers::ping(&m) }))).unwrap();
        let err = registry
            .register("ping", Arc::new(|_c, m| tokio::spawn(async move { handlers::ping(&m) })))
            .unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyRegistered(name) if name == "ping"));
    }

    #[tokio::test]
    async fn dispatch_rejects_missing_msg_field() {
        let mut registry = WorkerRegistry::new();
        registry.register_defaults();
        let ctx = Arc::new(default_context());
        let err = registry.dispatch(&ctx, &json!({})).unwrap_err();
        assert!(matches!(err, DispatchError::MissingMessageField));
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_worker() {
        let mut registry = WorkerRegistry::new();
        registry.register_defaults();
        let ctx = Arc::new(default_context());
        let err = registry.dispatch(&ctx, &json!({"msg": "nope"})).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownWorker(name) if name == "nope"));
    }

    #[tokio::test]
    async fn dispatch_runs_ping_and_returns_pong() {
        let mut registry = WorkerRegistry::new();
        registry.register_defaults();
        let ctx = Arc::new(default_context());
        let handle = registry.dispatch(&ctx, &json!({"msg": "ping"})).unwrap();
        let response = handle.await.unwrap();
        assert_eq!(response.status, 0);
        assert_eq!(response.response.get("response").unwrap(), "pong");
    }
}
