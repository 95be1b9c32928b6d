use serde::{Deserialize, Serialize};

/// A ranked cross-topic Subject surfaced to the current topic. Derived, not persisted
/// canonically — only the dismiss/share lifecycle events are journaled; the proposal
/// itself is recomputed on every cache miss from live Subject state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub topic_id: String,
    pub past_subject_id_hash: String,
    pub score: f64,
    pub rationale: String,
    pub created_at: i64,
    pub dismissed: bool,
}

/// Payload returned by `share` for insertion into the current topic's
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub subject_name: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_excerpts: Option<Vec<String>>,
}

/// One line of the append-only `journals/proposals.log`. Read back in full on startup to
/// repopulate the in-memory dismissed-set; never compacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JournalEntry {
    Dismissed {
        topic_id: String,
        past_subject_id_hash: String,
        at: i64,
    },
    Shared {
        topic_id: String,
        past_subject_id_hash: String,
        at: i64,
    },
}

impl JournalEntry {
    pub fn topic_id(&self) -> &str {
        match self {
            JournalEntry::Dismissed { topic_id, .. } => topic_id,
            JournalEntry::Shared { topic_id, .. } => topic_id,
        }
    }

    pub fn past_subject_id_hash(&self) -> &str {
        match self {
            JournalEntry::Dismissed {
                past_subject_id_hash,
                ..
            } => past_subject_id_hash,
            JournalEntry::Shared {
                past_subject_id_hash,
                ..
            } => past_subject_id_hash,
        }
    }
}
