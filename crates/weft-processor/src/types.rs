/// One unit of work handed to a topic's queue. A plain user
/// message carries an optional `client_msg_id` used as the dedup guard
/// (`lastProcessedId`); a `Welcome` entry is synthesized once per topic,
/// on creation, when the topic has an AI participant.
#[derive(Debug, Clone)]
pub enum QueuedMessage {
    User {
        client_msg_id: Option<String>,
        sender_id: String,
        text: String,
    },
    Welcome {
        ai_sender_id: String,
    },
}

impl QueuedMessage {
    pub fn client_msg_id(&self) -> Option<&str> {
        match self {
            QueuedMessage::User { client_msg_id, .. } => client_msg_id.as_deref(),
            QueuedMessage::Welcome { .. } => None,
        }
    }
}

/// Push events the processor fans out as messages move through a topic's
/// queue. `weft-gateway` forwards these to WS clients
/// verbatim; this crate has no notion of a connection.
#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    KeywordsUpdated { topic_id: String },
    SubjectsUpdated { topic_id: String },
    MessageStream { topic_id: String, message_id: String, chunk: String },
    MessageUpdated { topic_id: String, message: serde_json::Value },
    AiError { topic_id: String, error: String },
}
