use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use weft_core::types::TopicId;
use weft_processor::ProcessorEvent;
use weft_protocol::{frames::EventFrame, methods};

use crate::app::AppState;

/// Bridges [`ProcessorEvent`]s (internal, crate-agnostic) onto the WS broadcast channel
/// as wire-format [`EventFrame`]s. Also owns the one piece of cross-component wiring
/// requires outside `weft-proposals` itself: invalidating and recomputing a topic's
/// proposal cache whenever that topic's Subjects change. Runs for the lifetime of the
/// process; spawned once from `main`.
pub async fn run(app: Arc<AppState>) {
    let mut events = app.processor.on_event();
    loop {
        match events.recv().await {
            Ok(event) => handle_event(&app, event).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "processor event stream lagged, some updates were not pushed");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn handle_event(app: &Arc<AppState>, event: ProcessorEvent) {
    match event {
        ProcessorEvent::KeywordsUpdated { topic_id } => {
            publish(app, methods::EVENT_KEYWORDS_UPDATED, json!({ "topicId": topic_id }));
        }
        ProcessorEvent::SubjectsUpdated { topic_id } => {
            publish(app, methods::EVENT_SUBJECTS_UPDATED, json!({ "topicId": topic_id }));
            let topic = TopicId::from(topic_id.clone());
            app.proposals.invalidate(&topic);
            if app.proposals.get_for_topic(&topic).await.is_ok() {
                publish(app, methods::EVENT_PROPOSALS_UPDATED, json!({ "topicId": topic_id }));
            }
        }
        ProcessorEvent::MessageStream { topic_id, message_id, chunk } => {
            publish(app, methods::EVENT_MESSAGE_STREAM, json!({ "topicId": topic_id, "messageId": message_id, "chunk": chunk }));
        }
        ProcessorEvent::MessageUpdated { topic_id, message } => {
            publish(app, methods::EVENT_MESSAGE_UPDATED, json!({ "topicId": topic_id, "message": message }));
        }
        ProcessorEvent::AiError { topic_id, error } => {
            publish(app, methods::EVENT_AI_ERROR, json!({ "topicId": topic_id, "error": error }));
        }
    }
}

fn publish(app: &Arc<AppState>, event: &str, payload: serde_json::Value) {
    let seq = app.next_seq();
    let frame = EventFrame::new(event, payload).with_seq(seq);
    if let Ok(json) = serde_json::to_string(&frame) {
        app.broadcaster.send(json);
    }
}
