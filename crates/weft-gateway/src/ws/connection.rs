use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};
use weft_core::config::{HEARTBEAT_INTERVAL_SECS, MAX_PAYLOAD_BYTES};
use weft_protocol::frames::{EventFrame, InboundFrame};

use crate::app::AppState;
use crate::ws::{dispatch, send};

/// Axum handler — upgrades HTTP to WebSocket at `GET /ws`. No handshake/auth step:
/// identity and key management are an excluded collaborator, so a connection is request-
/// ready the instant it opens.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task, alive for the connection's lifetime. Three things
/// race in the select loop: inbound client frames (dispatched to
/// [`dispatch::route`]), broadcast push events (forwarded verbatim), and a
/// heartbeat tick.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    state.ws_clients.insert(conn_id.clone(), ());
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let mut broadcast_rx = state.broadcaster.subscribe();

    let mut tick_interval = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_ref: &str = &text;
                        if text_ref.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, size = text_ref.len(), "payload too large, dropping connection");
                            break;
                        }
                        if let Err(()) = handle_text_frame(&conn_id, text_ref, &mut tx, &state).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "WS read error, closing");
                        break;
                    }
                    _ => {}
                }
            }

            event = broadcast_rx.recv() => {
                match event {
                    Ok(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(conn_id = %conn_id, skipped, "event broadcast lagged, client missed events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = tick_interval.tick() => {
                let seq = state.next_seq();
                let tick = EventFrame::new("tick", serde_json::json!({})).with_seq(seq);
                if send::json(&mut tx, &tick).await.is_err() {
                    break;
                }
            }
        }
    }

    state.ws_clients.remove(&conn_id);
    info!(conn_id = %conn_id, "WS connection closed");
}

/// Parses one inbound text frame as a request and dispatches it. Returns
/// `Err(())` when the underlying sink write fails (connection gone);
/// malformed frames are logged and otherwise ignored rather than closing
/// the connection, since a client may be mid-upgrade to a newer protocol
/// version.
async fn handle_text_frame(
    conn_id: &str,
    text: &str,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    app: &Arc<AppState>,
) -> Result<(), ()> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "malformed frame, ignoring");
            return Ok(());
        }
    };

    let Some(req) = frame.as_req() else {
        debug!(conn_id = %conn_id, frame_type = %frame.frame_type, "ignoring non-request frame");
        return Ok(());
    };

    let res = dispatch::route(&req.method, req.params.as_ref(), &req.id, app).await;
    send::json(tx, &res).await.map_err(|_| ())
}
