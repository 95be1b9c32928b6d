use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weft_core::types::{now_millis, TopicId};

/// How a message's `text` should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    Plain,
    Markdown,
}

/// Lifecycle status of an assistant message while it streams. Not one of `Message` fields
/// directly, but required by /§7 to render a failed generation as a normal message with a
/// distinct status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Complete,
    Streaming,
    Error,
}

/// A content-hash reference to an attachment plus its MIME metadata. Attachment rendering
/// and storage of the referenced bytes are out of scope — this crate only carries the
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub content_hash: String,
    pub mime_type: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// A single message posted into a topic room. Unversioned: a Message is never mutated once persisted, so
/// it goes through [`weft_store::ObjectStore::store_unversioned`] rather
/// than carrying an ID hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub topic_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: i64,
    pub format: MessageFormat,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, rename = "isAI")]
    pub is_ai: bool,
    #[serde(default)]
    pub welcome: bool,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn new_user(topic_id: &TopicId, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.to_string(),
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: now_millis(),
            format: MessageFormat::Plain,
            attachments: Vec::new(),
            is_ai: false,
            welcome: false,
            status: MessageStatus::Complete,
        }
    }

    pub fn new_assistant(topic_id: &TopicId, sender_id: impl Into<String>, welcome: bool) -> Self {
        Self {
            topic_id: topic_id.to_string(),
            sender_id: sender_id.into(),
            text: String::new(),
            timestamp: now_millis(),
            format: MessageFormat::Plain,
            attachments: Vec::new(),
            is_ai: true,
            welcome,
            status: MessageStatus::Streaming,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("Message always serializes");
        value["$type$"] = json!("Message");
        value
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("$type$").and_then(Value::as_str) != Some("Message") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Metadata about a registered channel. Multiple `ChannelInfo`s can share one logical
/// `channelId` under federation — this crate only ever produces a single local owner
/// (federation transport is out of scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub owner: String,
    pub created_at: i64,
}

/// One line in a channel's append-only log. `content_hash` may reference a Message, a
/// Keyword, or a Subject — the log is a generic reference stream; readers that want only
/// messages filter on the fetched object's `$type$`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "author")]
    pub author_id: String,
}
