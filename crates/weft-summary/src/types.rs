use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weft_core::types::now_millis;

/// A versioned rollup of a topic's current understanding. Unlike Keyword/Subject, a
/// Summary's ID field literally includes its own version number — each version is
/// therefore its own content-addressed object rather than sharing one vhead-tracked ID
/// hash. The version chain is carried explicitly via `previous_version` (a content hash),
/// and "current version" is tracked by a separate per-topic head record
/// ([`crate::manager::SummaryHead`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub topic: String,
    pub content: String,
    pub subjects: Vec<String>,
    pub keywords: Vec<String>,
    pub version: u64,
    pub previous_version: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub change_reason: String,
}

impl Summary {
    pub fn v1(topic: impl Into<String>, content: impl Into<String>, subjects: Vec<String>, keywords: Vec<String>) -> Self {
        let now = now_millis();
        Self {
            topic: topic.into(),
            content: content.into(),
            subjects,
            keywords,
            version: 1,
            previous_version: None,
            created_at: now,
            updated_at: now,
            change_reason: "initial summary".to_string(),
        }
    }

    pub fn next(&self, content: impl Into<String>, subjects: Vec<String>, keywords: Vec<String>, previous_content_hash: String, reason: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            topic: self.topic.clone(),
            content: content.into(),
            subjects,
            keywords,
            version: self.version + 1,
            previous_version: Some(previous_content_hash),
            created_at: self.created_at,
            updated_at: now,
            change_reason: reason.into(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}-v{}", self.topic, self.version)
    }

    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("Summary always serializes");
        value["$type$"] = json!("Summary");
        value["id"] = json!(self.id());
        value
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("$type$").and_then(Value::as_str) != Some("Summary") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// A restart-context prompt produced when the conversation no longer fits the model's
/// context window: the latest Summary plus the most recent turns, kept verbatim.
#[derive(Debug, Clone)]
pub struct RestartContext {
    pub system_message: String,
    pub user_context: String,
}
