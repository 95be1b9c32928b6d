use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use weft_channels::TopicRoom;
use weft_core::types::{ChannelId, TopicId};
use weft_processor::QueuedMessage;
use weft_protocol::{frames::ResFrame, methods};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicParams {
    topic_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSubjectsParams {
    topic_id: String,
    #[serde(default)]
    include_archived: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRealtimeKeywordsParams {
    topic_id: String,
    draft_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposalsDismissParams {
    topic_id: String,
    past_subject_id_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposalsShareParams {
    topic_id: String,
    past_subject_id_hash: String,
    #[serde(default)]
    include_messages: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatSendMessageParams {
    topic_id: String,
    sender_id: String,
    text: String,
    #[serde(default)]
    client_msg_id: Option<String>,
}

/// Routes one WS request to its handler and returns the envelope to send
/// back. Every branch is grounded in exactly one component method;
/// this function owns no business logic of its own beyond parameter
/// parsing and error-envelope conversion.
pub async fn route(method: &str, params: Option<&Value>, req_id: &str, app: &Arc<AppState>) -> ResFrame {
    macro_rules! parse {
        ($ty:ty) => {
            match parse_params::<$ty>(params) {
                Ok(p) => p,
                Err(res) => return res(req_id),
            }
        };
    }

    match method {
        methods::TOPIC_ANALYSIS_GET_KEYWORDS => {
            let p = parse!(TopicParams);
            let topic = TopicId::from(p.topic_id);
            match app.graph.list_keywords(&topic).await {
                Ok(keywords) => ResFrame::ok(req_id, Value::Array(keywords.iter().map(|k| k.to_value()).collect())),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::TOPIC_ANALYSIS_GET_SUBJECTS => {
            let p = parse!(GetSubjectsParams);
            let topic = TopicId::from(p.topic_id);
            match app.graph.list_subjects(&topic, p.include_archived).await {
                Ok(subjects) => ResFrame::ok(req_id, Value::Array(subjects.iter().map(|s| s.to_value()).collect())),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::TOPIC_ANALYSIS_GET_SUMMARIES => {
            let p = parse!(TopicParams);
            let topic = TopicId::from(p.topic_id);
            match app.summary.history(&topic).await {
                Ok(summaries) => ResFrame::ok(req_id, Value::Array(summaries.iter().map(|s| s.to_value()).collect())),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::TOPIC_ANALYSIS_EXTRACT_REALTIME_KEYWORDS => {
            let p = parse!(ExtractRealtimeKeywordsParams);
            let topic = TopicId::from(p.topic_id);
            match app.analyzer.extract_preview(&topic, &p.draft_text).await {
                Ok(keywords) => ResFrame::ok(req_id, json!({ "keywords": keywords })),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::PROPOSALS_GET_FOR_TOPIC => {
            let p = parse!(TopicParams);
            let topic = TopicId::from(p.topic_id);
            match app.proposals.get_for_topic(&topic).await {
                Ok(proposals) => ResFrame::ok(req_id, proposals),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::PROPOSALS_DISMISS => {
            let p = parse!(ProposalsDismissParams);
            let topic = TopicId::from(p.topic_id);
            match app.proposals.dismiss(&topic, &p.past_subject_id_hash).await {
                Ok(()) => ResFrame::ok(req_id, json!({ "dismissed": true })),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::PROPOSALS_SHARE => {
            let p = parse!(ProposalsShareParams);
            let topic = TopicId::from(p.topic_id);
            match app.proposals.share(&topic, &p.past_subject_id_hash, p.include_messages).await {
                Ok(payload) => ResFrame::ok(req_id, payload),
                Err(e) => ResFrame::from_error(req_id, &e.into()),
            }
        }

        methods::CHAT_SEND_MESSAGE => {
            let p = parse!(ChatSendMessageParams);
            handle_send_message(app, p, req_id).await
        }

        methods::CHAT_STOP_STREAMING => {
            let p = parse!(TopicParams);
            let topic = TopicId::from(p.topic_id);
            app.processor.stop_streaming(&topic);
            ResFrame::ok(req_id, json!({ "stopped": true }))
        }

        _ => ResFrame::err(req_id, "METHOD_NOT_FOUND", &format!("unknown method '{}'", method)),
    }
}

/// Handles `chat:sendMessage`. A topic whose room has no prior AI-authored Message is
/// treated as newly created: a `Welcome` entry is enqueued ahead of the user's message so
/// it drains first, establishing the AI participant the processor's own
/// `has_ai_participant` check looks for before generating a response to the message that
/// follows it. Checking the room's durable history (rather than in-memory gateway state)
/// keeps this correct across restarts.
async fn handle_send_message(app: &Arc<AppState>, p: ChatSendMessageParams, req_id: &str) -> ResFrame {
    let topic = TopicId::from(p.topic_id.clone());
    let room = TopicRoom::new(ChannelId::from(p.topic_id.clone()), topic.clone(), app.channels.clone());

    let welcome_queued = match room.has_ai_participant().await {
        Ok(has_ai) => !has_ai,
        Err(e) => return ResFrame::from_error(req_id, &e.into()),
    };

    if welcome_queued {
        app.processor.enqueue(
            &topic,
            QueuedMessage::Welcome {
                ai_sender_id: app.processor.ai_sender_id().to_string(),
            },
        );
    }

    app.processor.enqueue(
        &topic,
        QueuedMessage::User {
            client_msg_id: p.client_msg_id,
            sender_id: p.sender_id,
            text: p.text,
        },
    );

    ResFrame::ok(req_id, json!({ "accepted": true, "topicId": p.topic_id, "welcomeQueued": welcome_queued }))
}

/// Parses `params` as `T`, returning a closure that builds the
/// `INVALID_PARAMS` error envelope on failure so callers can `return` it
/// directly with the request id in scope.
fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<&Value>) -> Result<T, Box<dyn Fn(&str) -> ResFrame>> {
    let value = params.cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        let message = e.to_string();
        Box::new(move |req_id: &str| ResFrame::err(req_id, "INVALID_PARAMS", &message)) as Box<dyn Fn(&str) -> ResFrame>
    })
}
