//! Websocket transport: subscription channel over the graphql-ws wire
//! protocol.
//!
//! The protocol loop is generic over message channels so the handshake and
//! subscription lifecycle are testable without sockets; the hyper upgrade
//! glue only shuttles frames in and out.

use crate::request::{WireRequest, WireResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use http::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use oxgql_core::{Executor, RawParams};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

pub const CONNECTION_INIT: &str = "connection_init";
pub const CONNECTION_ACK: &str = "connection_ack";
pub const CONNECTION_ERROR: &str = "connection_error";
pub const CONNECTION_TERMINATE: &str = "connection_terminate";
pub const KEEP_ALIVE: &str = "ka";
pub const START: &str = "start";
pub const DATA: &str = "data";
pub const ERROR: &str = "error";
pub const COMPLETE: &str = "complete";
pub const STOP: &str = "stop";

/// One frame of the subscription wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WsMessage {
    pub fn of(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

pub struct Websocket {
    pub keep_alive: Duration,
}

impl Default for Websocket {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(20),
        }
    }
}

impl Websocket {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for Websocket {
    fn supports(&self, request: &WireRequest) -> bool {
        request.method == Method::GET
            && request
                .header(UPGRADE)
                .map(|v| v.eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
            && request.header(SEC_WEBSOCKET_KEY).is_some()
    }

    async fn handle(&self, exec: &Executor, request: WireRequest) -> WireResponse {
        let mut request = request;
        let Some(key) = request.header(SEC_WEBSOCKET_KEY).map(str::to_string) else {
            return WireResponse::new(StatusCode::BAD_REQUEST);
        };
        let accept = derive_accept_key(key.as_bytes());

        if let Some(on_upgrade) = request.extensions.remove::<hyper::upgrade::OnUpgrade>() {
            let exec = exec.clone();
            let keep_alive = self.keep_alive;
            tokio::spawn(async move {
                let upgraded = match on_upgrade.await {
                    Ok(upgraded) => upgraded,
                    Err(err) => {
                        warn!(%err, "websocket upgrade failed");
                        return;
                    }
                };
                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    None,
                )
                .await;
                let (mut sink, stream) = ws.split();
                let (out_tx, mut out_rx) = mpsc::unbounded();
                let incoming = stream.filter_map(|frame| async move {
                    match frame {
                        Ok(Message::Text(text)) => serde_json::from_str::<WsMessage>(&text).ok(),
                        _ => None,
                    }
                });
                let writer = tokio::spawn(async move {
                    while let Some(msg) = out_rx.next().await {
                        let Ok(text) = serde_json::to_string(&msg) else {
                            continue;
                        };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                });
                run_protocol(exec, out_tx, Box::pin(incoming), keep_alive).await;
                let _ = writer.await;
            });
        }

        WireResponse::new(StatusCode::SWITCHING_PROTOCOLS)
            .with_header(UPGRADE, "websocket")
            .with_header(CONNECTION, "Upgrade")
            .with_header(SEC_WEBSOCKET_ACCEPT, &accept)
    }
}

/// Drives one websocket connection from handshake to teardown.
///
/// Sends go through `out`; the caller owns the frame encoding on both
/// sides. Returns when the peer terminates, the incoming stream ends, or
/// the handshake is violated.
pub async fn run_protocol<R>(
    exec: Executor,
    out: mpsc::UnboundedSender<WsMessage>,
    mut incoming: R,
    keep_alive: Duration,
) where
    R: Stream<Item = WsMessage> + Unpin + Send,
{
    match incoming.next().await {
        Some(msg) if msg.kind == CONNECTION_INIT => {}
        _ => {
            let _ = out.unbounded_send(
                WsMessage::of(CONNECTION_ERROR)
                    .with_payload(serde_json::json!({"message": "expected connection_init"})),
            );
            return;
        }
    }
    let _ = out.unbounded_send(WsMessage::of(CONNECTION_ACK));
    let _ = out.unbounded_send(WsMessage::of(KEEP_ALIVE));

    let mut active: FxHashMap<String, tokio::task::JoinHandle<()>> = FxHashMap::default();
    let mut ka = tokio::time::interval_at(
        tokio::time::Instant::now() + keep_alive,
        keep_alive,
    );

    loop {
        let msg = tokio::select! {
            msg = incoming.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = ka.tick() => {
                let _ = out.unbounded_send(WsMessage::of(KEEP_ALIVE));
                continue;
            }
        };
        match msg.kind.as_str() {
            START => {
                let id = msg.id.unwrap_or_default();
                let params: RawParams =
                    match serde_json::from_value(msg.payload.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(err) => {
                            let _ = out.unbounded_send(
                                WsMessage::of(ERROR).with_id(id.clone()).with_payload(
                                    serde_json::json!([
                                        {"message": format!("start payload could not be decoded: {err}")}
                                    ]),
                                ),
                            );
                            let _ = out.unbounded_send(WsMessage::of(COMPLETE).with_id(id));
                            continue;
                        }
                    };
                let exec = exec.clone();
                let out = out.clone();
                let task_id = id.clone();
                let handle = tokio::spawn(async move {
                    match exec.create_operation_context(params) {
                        Ok(ctx) => {
                            let mut responses = exec.dispatch_operation(Arc::new(ctx)).await;
                            while let Some(response) = responses.next().await {
                                let payload =
                                    serde_json::to_value(&response).unwrap_or(Value::Null);
                                let _ = out.unbounded_send(
                                    WsMessage::of(DATA)
                                        .with_id(task_id.clone())
                                        .with_payload(payload),
                                );
                            }
                        }
                        Err(failure) => {
                            let response =
                                exec.dispatch_error(failure.ctx, failure.errors).await;
                            let payload =
                                serde_json::to_value(&response.errors).unwrap_or(Value::Null);
                            let _ = out.unbounded_send(
                                WsMessage::of(ERROR)
                                    .with_id(task_id.clone())
                                    .with_payload(payload),
                            );
                        }
                    }
                    let _ = out.unbounded_send(WsMessage::of(COMPLETE).with_id(task_id));
                });
                active.insert(id, handle);
            }
            STOP => {
                let id = msg.id.unwrap_or_default();
                if let Some(handle) = active.remove(&id) {
                    // a finished producer already sent its complete frame
                    if !handle.is_finished() {
                        handle.abort();
                        let _ = out.unbounded_send(WsMessage::of(COMPLETE).with_id(id));
                    }
                }
            }
            CONNECTION_TERMINATE => break,
            other => debug!(kind = other, "ignoring unexpected websocket message"),
        }
    }

    for handle in active.into_values() {
        handle.abort();
    }
}
