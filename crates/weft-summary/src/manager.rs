use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};
use weft_channels::{recent_window, ChannelManager, Message as RoomMessage};
use weft_core::types::{now_millis, ChannelId, TopicId};
use weft_graph::GraphStore;
use weft_llm::LlmProvider;
use weft_store::ObjectStore;

use crate::error::{Result, SummaryError};
use crate::types::{RestartContext, Summary};

const DEFAULT_SIGNIFICANCE_JACCARD_FLOOR: f64 = 0.8;

fn summary_head_id_hash(topic: &str) -> Result<String> {
    let stub = json!({"$type$": "SummaryHead", "topic": topic});
    Ok(weft_store::canonical::id_hash(&stub, &["$type$", "topic"])?)
}

/// Pointer to the current Summary version for a topic. Summary objects
/// are content-addressed by `{topicId}-v{version}` so they
/// cannot share a single vhead the way Keyword/Subject do; this head
/// record plays that role instead, itself stored through the normal
/// `storeVersioned` vhead mechanism.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryHead {
    topic: String,
    version: u64,
    content_hash: String,
}

impl SummaryHead {
    fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("SummaryHead always serializes");
        value["$type$"] = json!("SummaryHead");
        value
    }

    fn from_value(value: &Value) -> Option<Self> {
        if value.get("$type$").and_then(Value::as_str) != Some("SummaryHead") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Maintains the versioned Summary chain per topic and builds
/// context-window-aware restart prompts.
pub struct SummaryManager {
    store: Arc<ObjectStore>,
    channels: Arc<ChannelManager>,
    graph: Arc<GraphStore>,
    analyzer: Arc<weft_analyzer::TopicAnalyzer>,
    verbatim_tail_turns: usize,
    significance_jaccard_floor: f64,
}

impl SummaryManager {
    pub fn new(
        store: Arc<ObjectStore>,
        channels: Arc<ChannelManager>,
        graph: Arc<GraphStore>,
        analyzer: Arc<weft_analyzer::TopicAnalyzer>,
        verbatim_tail_turns: usize,
    ) -> Self {
        Self {
            store,
            channels,
            graph,
            analyzer,
            verbatim_tail_turns,
            significance_jaccard_floor: DEFAULT_SIGNIFICANCE_JACCARD_FLOOR,
        }
    }

    /// Returns the latest Summary version for `topic_id`, if any.
    pub async fn get_current(&self, topic_id: &TopicId) -> Result<Option<Summary>> {
        let head_id_hash = summary_head_id_hash(topic_id.as_str())?;
        match self.store.get_by_id_hash(&head_id_hash).await {
            Ok(value) => {
                let head = SummaryHead::from_value(&value)
                    .ok_or_else(|| SummaryError::InvariantViolation("stored SummaryHead has wrong $type$".into()))?;
                let summary_value = self.store.get_by_content_hash(&head.content_hash).await?;
                Ok(Summary::from_value(&summary_value))
            }
            Err(weft_store::StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Walks the version chain for `topic_id` from the current version back to v1, newest
    /// first. Each hop follows `previous_version`, a content hash, so this never touches
    /// the vhead mechanism the way [`Self::get_current`] does.
    pub async fn history(&self, topic_id: &TopicId) -> Result<Vec<Summary>> {
        let mut out = Vec::new();
        let Some(mut current) = self.get_current(topic_id).await? else {
            return Ok(out);
        };
        loop {
            let previous = current.previous_version.clone();
            out.push(current.clone());
            match previous {
                None => break,
                Some(hash) => {
                    let value = self.store.get_by_content_hash(&hash).await?;
                    match Summary::from_value(&value) {
                        Some(s) => current = s,
                        None => break,
                    }
                }
            }
        }
        Ok(out)
    }

    /// Creates or advances the Summary version chain for `topic_id`. A v1 is created
    /// unconditionally if none exists; otherwise a new version is only written when the
    /// change is "significant": content similarity (Jaccard over tokenized words) is
    /// below the configured floor, OR at least one subject was added, OR more than one
    /// subject was removed.
    pub async fn update_summary(
        &self,
        topic_id: &TopicId,
        new_content: &str,
        new_subjects: &[String],
        new_keywords: &[String],
    ) -> Result<Summary> {
        let current = self.get_current(topic_id).await?;

        let summary = match current {
            None => Summary::v1(topic_id.to_string(), new_content, new_subjects.to_vec(), new_keywords.to_vec()),
            Some(prior) => {
                if !self.is_significant(&prior, new_content, new_subjects) {
                    debug!(topic_id = %topic_id, version = prior.version, "summary update not significant, keeping current version");
                    return Ok(prior);
                }
                let prior_content_hash = self.store.store_unversioned(&prior.to_value()).await?;
                prior.next(new_content, new_subjects.to_vec(), new_keywords.to_vec(), prior_content_hash, "content or subject set changed")
            }
        };

        self.persist(topic_id, summary).await
    }

    async fn persist(&self, topic_id: &TopicId, summary: Summary) -> Result<Summary> {
        if summary.version == 1 {
            debug_assert!(summary.previous_version.is_none());
        } else {
            debug_assert!(summary.previous_version.is_some());
        }

        let content_hash = self.store.store_unversioned(&summary.to_value()).await?;
        let head_id_hash = summary_head_id_hash(topic_id.as_str())?;
        let head = SummaryHead {
            topic: topic_id.to_string(),
            version: summary.version,
            content_hash: content_hash.clone(),
        };
        self.store.store_versioned(&head_id_hash, &head.to_value()).await?;
        self.channels
            .append_entry(&ChannelId::from(topic_id.to_string()), &content_hash, "summary-manager", now_millis())
            .await?;

        info!(topic_id = %topic_id, version = summary.version, "summary version written");
        Ok(summary)
    }

    fn is_significant(&self, prior: &Summary, new_content: &str, new_subjects: &[String]) -> bool {
        let similarity = jaccard_similarity(&prior.content, new_content);
        if similarity < self.significance_jaccard_floor {
            return true;
        }
        let prior_set: HashSet<&String> = prior.subjects.iter().collect();
        let new_set: HashSet<&String> = new_subjects.iter().collect();
        let added = new_set.difference(&prior_set).count();
        let removed = prior_set.difference(&new_set).count();
        added > 0 || removed > 1
    }

    /// Builds a restart prompt for a topic whose conversation no longer fits the model's
    /// context window: the latest Summary enriched with top active subjects/keywords,
    /// plus the most recent `verbatim_tail_turns` messages kept verbatim. If no Summary
    /// exists yet, one is synthesized inline by invoking the analyzer over the last
    /// message window first.
    pub async fn build_restart_context(&self, topic_id: &TopicId) -> Result<RestartContext> {
        let channel_id = ChannelId::from(topic_id.to_string());
        let messages = self.channels.iterate_topic_messages(&channel_id, topic_id).await?;

        let summary = match self.get_current(topic_id).await? {
            Some(s) => s,
            None => {
                self.analyzer.analyze(topic_id).await?;
                let subjects = self.graph.list_subjects(topic_id, false).await?;
                let subject_ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
                let synthesized = self.synthesize_summary_content(&messages, &subject_ids);
                self.update_summary(topic_id, &synthesized, &subject_ids, &[]).await?
            }
        };

        let subjects = self.graph.list_subjects(topic_id, false).await?;
        let mut ranked = subjects;
        ranked.sort_by(|a, b| b.message_count.cmp(&a.message_count).then(b.last_seen_at.cmp(&a.last_seen_at)));
        let top_k: Vec<String> = ranked.iter().take(5).map(|s| s.id.clone()).collect();

        let system_message = if top_k.is_empty() {
            summary.content.clone()
        } else {
            format!("{}\n\nActive subjects: {}.", summary.content, top_k.join(", "))
        };

        let tail = recent_window(&messages, self.verbatim_tail_turns);
        let user_context = tail
            .iter()
            .map(|m| format!("{}: {}", m.sender_id, m.text))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(RestartContext { system_message, user_context })
    }

    fn synthesize_summary_content(&self, messages: &[RoomMessage], subject_ids: &[String]) -> String {
        if subject_ids.is_empty() {
            return format!("Conversation with {} messages so far; no subjects identified yet.", messages.len());
        }
        format!("Conversation touching on: {}.", subject_ids.join(", "))
    }

    /// Estimates whether the prompt built from `messages` plus `summary` fits the model's
    /// usable window, used by C8 before each generation.
    pub fn fits_context_window(&self, llm: &dyn LlmProvider, model: &str, reserved_for_response: usize, messages: &[RoomMessage]) -> bool {
        let window = llm.context_window(model) as usize;
        let usable = window.saturating_sub(reserved_for_response);
        let estimated: usize = messages.iter().map(|m| llm.estimate_tokens(&m.text) as usize).sum();
        estimated <= usable
    }
}

/// Jaccard similarity over whitespace-tokenized, lowercased words.
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_llm::MockLlmProvider;

    async fn harness() -> (Arc<ObjectStore>, Arc<ChannelManager>, Arc<GraphStore>, Arc<weft_analyzer::TopicAnalyzer>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), channels.clone(), 5_000));
        let llm = Arc::new(MockLlmProvider::new());
        let analyzer = Arc::new(weft_analyzer::TopicAnalyzer::new(channels.clone(), graph.clone(), llm, "mock-model"));
        (store, channels, graph, analyzer)
    }

    #[tokio::test]
    async fn creates_v1_then_advances_on_significant_change() {
        let (store, channels, graph, analyzer) = harness().await;
        let manager = SummaryManager::new(store, channels, graph, analyzer, 6);
        let topic = TopicId::from("t1");

        let v1 = manager.update_summary(&topic, "we discussed rust async runtimes", &["rust+async".into()], &[]).await.unwrap();
        assert_eq!(v1.version, 1);
        assert!(v1.previous_version.is_none());

        let v2 = manager
            .update_summary(&topic, "completely different topic about gardening and soil chemistry", &["rust+async".into(), "gardening".into()], &[])
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert!(v2.previous_version.is_some());

        let current = manager.get_current(&topic).await.unwrap().unwrap();
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn insignificant_change_does_not_advance_version() {
        let (store, channels, graph, analyzer) = harness().await;
        let manager = SummaryManager::new(store, channels, graph, analyzer, 6);
        let topic = TopicId::from("t2");

        let content = "we discussed rust async runtimes and tokio schedulers at length";
        manager.update_summary(&topic, content, &["rust+async".into()], &[]).await.unwrap();
        let unchanged = manager.update_summary(&topic, content, &["rust+async".into()], &[]).await.unwrap();
        assert_eq!(unchanged.version, 1);
    }
}
