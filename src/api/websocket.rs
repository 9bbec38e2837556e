//! The WebSocket execution endpoint.
//!
//! One message in, one message out. Each incoming frame carries a target
//! description and a command; the handler builds a fresh inventory and
//! result collector, runs the work to completion through the engine, and
//! replies with either the first outcome (single-host flow, preferring
//! ok > failed > unreachable > global error) or the full result set
//! (multi-host flow). The socket stays open for further requests.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::state::AppState;
use super::types::{ErrorReply, ExecRequest, MultiExecRequest, WsRequest};
use crate::callback::{ResultCollector, ResultSet};
use crate::facts;
use crate::inventory::Inventory;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("execution socket opened");

    let (mut sender, mut receiver) = socket.split();

    while let Some(result) = receiver.next().await {
        let message = match result {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "socket error");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let reply = dispatch(&state, &text).await;
                if sender.send(Message::Text(reply)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => {
                debug!("client closed socket");
                break;
            }
            // Pings are answered by the framework.
            _ => {}
        }
    }

    info!("execution socket closed");
}

/// Parse one frame and run it; always yields a JSON reply string.
async fn dispatch(state: &Arc<AppState>, text: &str) -> String {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "unparsable request frame");
            return error_json(ErrorReply::new(format!("invalid request: {}", e)));
        }
    };

    match request {
        WsRequest::Single(req) => run_single(state, req).await,
        WsRequest::Multi(req) => run_multi(state, req).await,
    }
}

async fn run_single(state: &Arc<AppState>, req: ExecRequest) -> String {
    let inventory = match Inventory::build(&[req.descriptor()]) {
        Ok(inv) => inv,
        Err(e) => return error_json(ErrorReply::new(e.to_string())),
    };

    let collector = Arc::new(ResultCollector::new());
    let rejection = state
        .engine()
        .run_named_module(&inventory, "shell", &req.cmd, req.pattern(), &collector)
        .await;

    if let Some(notice) = rejection {
        return error_json(ErrorReply::rejection(&notice));
    }

    collector
        .first_result_json()
        .unwrap_or_else(|| error_json(ErrorReply::new("no result produced")))
}

async fn run_multi(state: &Arc<AppState>, req: MultiExecRequest) -> String {
    let inventory = match Inventory::build(&req.hosts) {
        Ok(inv) => inv,
        Err(e) => return error_json(ErrorReply::new(e.to_string())),
    };

    let collector = Arc::new(ResultCollector::new());
    let rejection = state
        .engine()
        .run_named_module(&inventory, &req.module, &req.args, &req.pattern, &collector)
        .await;

    if let Some(notice) = rejection {
        return error_json(ErrorReply::rejection(&notice));
    }

    multi_reply(&req.module, &collector.snapshot())
}

/// Serialize a multi-host run's outcome. A facts-probe run replies with the
/// summarized host records; the failed and unreachable buckets ride along
/// untouched so callers still see which hosts produced nothing.
fn multi_reply(module: &str, set: &ResultSet) -> String {
    let result = if module == "setup" {
        serde_json::to_string(&serde_json::json!({
            "servers": facts::summarize(set),
            "failed": set.failed,
            "unreachable": set.unreachable,
            "error": set.error,
        }))
    } else {
        serde_json::to_string(set)
    };

    result.unwrap_or_else(|e| error_json(ErrorReply::new(format!("serialization error: {}", e))))
}

fn error_json(reply: ErrorReply) -> String {
    serde_json::to_string(&reply)
        .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    fn facts_run() -> ResultSet {
        let collector = ResultCollector::new();
        collector.record_ok(
            "web1",
            "setup",
            json!({
                "ansible_facts": {
                    "ansible_hostname": "web1.internal",
                    "ansible_kernel": "6.1.0-18-amd64",
                    "ansible_memtotal_mb": 2048
                },
                "changed": false
            }),
        );
        collector.record_unreachable("web2", "setup", json!({"msg": "timeout"}));
        collector.snapshot()
    }

    #[test]
    fn test_setup_reply_is_summarized() {
        let reply: JsonValue = serde_json::from_str(&multi_reply("setup", &facts_run())).unwrap();

        let servers = reply["servers"].as_array().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0]["host"], "web1");
        assert_eq!(servers[0]["hostname"], "web1.internal");
        assert_eq!(servers[0]["ram_gb"], 2);

        let unreachable = reply["unreachable"].as_array().unwrap();
        assert_eq!(unreachable.len(), 1);
        assert_eq!(unreachable[0]["host"], "web2");
    }

    #[test]
    fn test_shell_reply_is_the_raw_result_set() {
        let collector = ResultCollector::new();
        collector.record_ok("web1", "shell", json!({"stdout": "hi", "rc": 0}));

        let reply: JsonValue =
            serde_json::from_str(&multi_reply("shell", &collector.snapshot())).unwrap();
        assert_eq!(reply["ok"][0]["host"], "web1");
        assert!(reply.get("servers").is_none());
    }
}
