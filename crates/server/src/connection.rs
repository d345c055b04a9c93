use std::sync::Arc;
use std::time::Duration;

use protocol::auth;
use protocol::message;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use workers::{Response, WorkerContext, WorkerRegistry};

/// Interval at which an `alive` keep-alive frame is sent while a worker is
/// still running.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

enum WaitOutcome {
    Done(Response),
    Panicked,
    TimedOut,
    Abandoned,
}

/// Runs one connection's full state machine: authenticate, receive exactly
/// one request, dispatch it, wait for completion while emitting keep-alives,
/// and send the terminal response (or timeout) followed by the sentinel.
///
/// Every early return below corresponds to a transition into `CLOSE` or
/// `ABANDON`; `CLOSE` always attempts the end-of-stream sentinel first,
/// `ABANDON` does not, since the peer has already demonstrated it cannot be
/// written to.
pub(crate) async fn handle_connection<S>(mut stream: S, registry: &WorkerRegistry, context: &Arc<WorkerContext>, secret: &[u8], deadline: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connection_id = uuid::Uuid::new_v4().to_string();

    if let Err(err) = auth::deliver_challenge(&mut stream, secret).await {
        tracing::warn!(connection_id, %err, "authentication failed");
        return;
    }
    tracing::info!(connection_id, "client authenticated");

    let msg = match message::recv_message::<_, Value>(&mut stream).await {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            tracing::warn!(connection_id, "client sent end-of-stream before a request");
            close(&mut stream).await;
            return;
        }
        Err(err) => {
            tracing::warn!(connection_id, %err, "failed to decode request frame");
            close(&mut stream).await;
            return;
        }
    };
    tracing::debug!(connection_id, %msg, "received request");

    let handle = match registry.dispatch(context, &msg) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(connection_id, %err, "dispatch failed");
            close(&mut stream).await;
            return;
        }
    };

    let outcome = wait_for_completion(&mut stream, handle, &connection_id, deadline).await;

    match outcome {
        WaitOutcome::Abandoned => {
            tracing::warn!(connection_id, "broken pipe during keep-alive; abandoning connection");
        }
        WaitOutcome::Done(response) => {
            send_final_response(&mut stream, &connection_id, &response).await;
            close(&mut stream).await;
        }
        WaitOutcome::Panicked => {
            let response = Response::failure("worker task failed unexpectedly");
            send_final_response(&mut stream, &connection_id, &response).await;
            close(&mut stream).await;
        }
        WaitOutcome::TimedOut => {
            tracing::info!(connection_id, "request deadline exceeded");
            let reply = json!({
                "msg": "response",
                "status_message": "failed",
                "id": connection_id,
                "status": 1,
                "reason": "timeout",
                "ver": "v1",
            });
            let _ = message::send_message(&mut stream, Some(&reply)).await;
            close(&mut stream).await;
        }
    }
}

async fn wait_for_completion<S>(stream: &mut S, mut handle: workers::WorkerHandle, connection_id: &str, deadline: Duration) -> WaitOutcome
where
    S: AsyncWrite + Unpin,
{
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // the first tick fires immediately; consume it

    let started = Instant::now();

    loop {
        tokio::select! {
            result = &mut handle => {
                return match result {
                    Ok(response) => WaitOutcome::Done(response),
                    Err(_join_error) => WaitOutcome::Panicked,
                };
            }
            () = &mut sleep => {
                return WaitOutcome::TimedOut;
            }
            _ = keepalive.tick() => {
                let alive = json!({
                    "msg": "alive",
                    "id": connection_id,
                    "dt": started.elapsed().as_secs_f64(),
                });
                if message::send_message(stream, Some(&alive)).await.is_err() {
                    return WaitOutcome::Abandoned;
                }
            }
        }
    }
}

async fn send_final_response<S>(stream: &mut S, connection_id: &str, response: &Response)
where
    S: AsyncWrite + Unpin,
{
    let reply = if response.status == 0 {
        json!({
            "msg": "response",
            "status_message": "OK",
            "id": connection_id,
            "status": 0,
            "details": response.response,
            "ver": "v1",
        })
    } else {
        json!({
            "msg": "response",
            "status_message": "ERROR",
            "id": connection_id,
            "status": response.status,
            "details": response.error,
            "ver": "v1",
        })
    };

    if message::send_message(stream, Some(&reply)).await.is_err() {
        tracing::warn!(connection_id, "broken pipe sending final response");
    }
}

async fn close<S>(stream: &mut S)
where
    S: AsyncWrite + Unpin,
{
    let _ = message::send_message::<_, ()>(stream, None).await;
}
