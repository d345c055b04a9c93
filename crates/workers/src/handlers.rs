use std::sync::Arc;
use std::time::Duration;

use actions::{Actions, SystemClock};
use objectstore::stat_object;
use serde_json::{Map, Value, json};

use crate::context::WorkerContext;
use crate::registry::Response;

/// `{"msg":"ping"}` → `{"response":"pong"}`. Runs synchronously; nothing here
/// ever suspends.
#[must_use]
pub fn ping(_msg: &Value) -> Response {
    let mut payload = Map::new();
    payload.insert("response".to_string(), json!("pong"));
    Response::ok(payload)
}

/// `{"msg":"wait","delay":<seconds>}` → sleeps for `delay` seconds, then
/// echoes it back. Exercises the server's keep-alive path during tests and
/// demos: a sufficiently long delay outlives the per-request deadline.
pub async fn wait(msg: &Value) -> Response {
    let Some(delay) = msg.get("delay").and_then(Value::as_f64) else {
        return Response::failure("missing \"delay\" field");
    };

    tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;

    let mut payload = Map::new();
    payload.insert("response".to_string(), json!("wait"));
    payload.insert("delay".to_string(), json!(delay));
    Response::ok(payload)
}

/// `{"msg":"stat","path":"…"}` → the object's modification time.
pub async fn stat(ctx: &Arc<WorkerContext>, msg: &Value) -> Response {
    let Some(path) = msg.get("path").and_then(Value::as_str) else {
        return Response::failure("missing \"path\" field");
    };

    let object = match ctx.path_mapper().parse(path) {
        Ok(object) => object,
        Err(err) => return Response::failure(err.to_string()),
    };

    let client = ctx.client();
    let result = tokio::task::spawn_blocking(move || stat_object(&**client, object.pool(), object.object_id()))
        .await
        .expect("stat worker task does not panic");

    match result {
        Ok(info) => {
            let mut payload = Map::new();
            payload.insert("response".to_string(), json!("stat"));
            payload.insert("stat".to_string(), json!(info.mtime));
            Response::ok(payload)
        }
        Err(err) => Response::failure(err.to_string()),
    }
}

/// `{"msg":"cksum","path":"…","action":"get|inget|check|verify|metaonly|fileonly","algtype":"adler32"}`.
pub async fn cksum(ctx: &Arc<WorkerContext>, msg: &Value) -> Response {
    let Some(path) = msg.get("path").and_then(Value::as_str) else {
        return Response::failure("missing \"path\" field");
    };
    let Some(action) = msg.get("action").and_then(Value::as_str) else {
        return Response::failure("missing \"action\" field");
    };
    let algtype = msg.get("algtype").and_then(Value::as_str).unwrap_or("adler32").to_ascii_lowercase();

    if algtype != actions::ALGORITHM {
        return Response::failure("Only adler32 supported");
    }

    let object = match ctx.path_mapper().parse(path) {
        Ok(object) => object,
        Err(err) => return Response::failure(err.to_string()),
    };

    let action = action.to_ascii_lowercase();
    let client = ctx.client();
    let read_block_size = ctx.read_block_size();

    let result = tokio::task::spawn_blocking(move || {
        let clock = SystemClock;
        let actions = Actions::new(&**client, &clock, read_block_size);
        let pool = object.pool();
        let name = object.object_id();

        match action.as_str() {
            "get" => actions.get_checksum(pool, name, false).map(Some).map_err(|e| e.to_string()),
            "fileonly" => actions.get_from_file(pool, name).map(Some).map_err(|e| e.to_string()),
            "metaonly" => actions.get_from_metadata(pool, name).map_err(|e| e.to_string()),
            "inget" | "check" => actions.inget(pool, name, true).map(Some).map_err(|e| e.to_string()),
            "verify" => actions.verify(pool, name, true).map_err(|e| e.to_string()),
            other => Err(format!("action {other:?} is not implemented")),
        }
    })
    .await
    .expect("cksum worker task does not panic");

    match result {
        Ok(Some(record)) => {
            let mut payload = Map::new();
            payload.insert("response".to_string(), json!("cksum"));
            payload.insert("digest".to_string(), json!(record.value_hex()));
            Response::ok(payload)
        }
        Ok(None) => Response::failure("Failed to get checksum"),
        Err(message) => Response::failure(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::default_context;
    use objectstore::{XATTR_OBJECT_SIZE, XATTR_TOTAL_SIZE, chunk_name};
    use serde_json::json;

    #[tokio::test]
    async fn ping_returns_pong_immediately() {
        let response = ping(&json!({"msg": "ping"}));
        assert_eq!(response.status, 0);
        assert_eq!(response.response.get("response").unwrap(), "pong");
    }

    #[tokio::test]
    async fn wait_echoes_the_requested_delay() {
        let response = wait(&json!({"msg": "wait", "delay": 0.01})).await;
        assert_eq!(response.status, 0);
        assert_eq!(response.response.get("delay").unwrap(), 0.01);
    }

    #[tokio::test]
    async fn wait_without_delay_field_fails() {
        let response = wait(&json!({"msg": "wait"})).await;
        assert_eq!(response.status, 1);
    }

    #[tokio::test]
    async fn cksum_rejects_non_adler32_algtype() {
        let ctx = Arc::new(default_context());
        let response = cksum(&ctx, &json!({"msg":"cksum","path":"pool:obj","action":"get","algtype":"sha256"})).await;
        assert_eq!(response.status, 1);
    }

    #[tokio::test]
    async fn cksum_fileonly_on_missing_object_fails() {
        let ctx = Arc::new(default_context());
        let response = cksum(&ctx, &json!({"msg":"cksum","path":"pool:missing","action":"fileonly","algtype":"adler32"})).await;
        assert_eq!(response.status, 1);
    }

    #[tokio::test]
    async fn stat_reports_missing_object_as_failure() {
        let ctx = Arc::new(default_context());
        let response = stat(&ctx, &json!({"msg":"stat","path":"pool:missing"})).await;
        assert_eq!(response.status, 1);
    }

    #[test]
    fn chunk_name_used_by_tests_formats_correctly() {
        assert_eq!(chunk_name("obj", 0), "obj.0000000000000000");
    }

    #[test]
    fn xattr_constants_are_reexported_for_fixtures() {
        assert_eq!(XATTR_OBJECT_SIZE, "striper.layout.object_size");
        assert_eq!(XATTR_TOTAL_SIZE, "striper.size");
    }
}
