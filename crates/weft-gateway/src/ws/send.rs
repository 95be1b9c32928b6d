use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;

/// Serializes any value to JSON and sends it over the WS sink.
pub async fn json<T: serde::Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}
