use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use weft_core::types::{now_millis, ChannelId, TopicId};
use weft_store::ObjectStore;

use crate::channel::{merge_channel_logs, ChannelLog};
use crate::error::Result;
use crate::types::{ChannelInfo, LogEntry, Message};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Broadcast payload for `onUpdated` subscribers: any write to
/// a channel, whether it is a Message, a Keyword, or a Subject version.
#[derive(Debug, Clone)]
pub struct ChannelUpdate {
    pub channel_id: String,
    pub timestamp: i64,
    pub content_hash: String,
}

/// Append-only per-channel object log and multi-channel iteration. A channel is
/// identified by a `channelId` string — for topics this is the topic's own ID. Entries
/// reference objects already written to the object store; the manager never stores bytes
/// itself.
pub struct ChannelManager {
    store: Arc<ObjectStore>,
    updates: DashMap<String, broadcast::Sender<ChannelUpdate>>,
}

impl ChannelManager {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self {
            store,
            updates: DashMap::new(),
        }
    }

    pub fn on_updated(&self, channel_id: &ChannelId) -> broadcast::Receiver<ChannelUpdate> {
        self.updates
            .entry(channel_id.to_string())
            .or_insert_with(|| broadcast::channel(UPDATE_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Persists `message` via the object store (unversioned — Messages are never
    /// mutated), appends its content hash to the channel log, then notifies subscribers.
    /// Object write happens before the log entry referencing it.
    pub async fn post_message(&self, channel_id: &ChannelId, message: &Message) -> Result<String> {
        let content_hash = self.store.store_unversioned(&message.to_value()).await?;
        self.append_entry(channel_id, &content_hash, &message.sender_id, message.timestamp)
            .await?;
        debug!(channel_id = %channel_id, content_hash = %content_hash, "posted message to channel log");
        Ok(content_hash)
    }

    /// Appends a reference to an already-persisted object (a Keyword or Subject version
    /// written by `weft-graph`) to the channel log and notifies subscribers. The object
    /// must already be durable; this method performs no store write itself.
    pub async fn append_entry(
        &self,
        channel_id: &ChannelId,
        content_hash: &str,
        author_id: &str,
        timestamp: i64,
    ) -> Result<()> {
        let entry = LogEntry {
            content_hash: content_hash.to_string(),
            timestamp,
            author_id: author_id.to_string(),
        };
        ChannelLog::new(self.store.root(), channel_id.as_str())
            .append(&entry)
            .await?;

        if let Some(tx) = self.updates.get(channel_id.as_str()) {
            let _ = tx.send(ChannelUpdate {
                channel_id: channel_id.to_string(),
                timestamp,
                content_hash: content_hash.to_string(),
            });
        }
        Ok(())
    }

    pub async fn create_channel(&self) -> Result<ChannelInfo> {
        let id = ChannelId::new();
        let info = ChannelInfo {
            channel_id: id.to_string(),
            owner: "local".to_string(),
            created_at: now_millis(),
        };
        info!(channel_id = %id, "created channel");
        tokio::fs::create_dir_all(self.store.root().join("channels").join(id.as_str())).await?;
        Ok(info)
    }

    /// Lists every channel directory known to this store, i.e. every topic that has ever
    /// received a post. Used by the proposal engine to find candidate subjects in topics
    /// other than the current one.
    pub async fn list_channel_ids(&self) -> Result<Vec<String>> {
        let channels_dir = self.store.root().join("channels");
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&channels_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Returns the local `ChannelInfo` matching `channel_id`. Federation (multiple owners
    /// for one logical channel) is out of scope, so this always resolves to at most one
    /// entry.
    pub fn get_matching_channel_infos(&self, channel_id: &ChannelId) -> Vec<ChannelInfo> {
        vec![ChannelInfo {
            channel_id: channel_id.to_string(),
            owner: "local".to_string(),
            created_at: 0,
        }]
    }

    /// Reads every log entry across `channel_ids`, merged by timestamp with a content-
    /// hash tiebreak and deduplicated. Does not resolve objects — callers fetch and
    /// filter by `$type$` themselves.
    pub async fn iterate_entries(&self, channel_ids: &[ChannelId]) -> Result<Vec<LogEntry>> {
        let ids: Vec<String> = channel_ids.iter().map(|c| c.to_string()).collect();
        merge_channel_logs(self.store.root(), &ids).await
    }

    /// Reads every Message across `channel_ids`, merged and deduplicated
    /// the same way as [`Self::iterate_entries`], with non-Message entries
    /// (Keyword/Subject references) filtered out.
    pub async fn iterate_messages(&self, channel_ids: &[ChannelId]) -> Result<Vec<Message>> {
        let entries = self.iterate_entries(channel_ids).await?;
        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            let value = self.store.get_by_content_hash(&entry.content_hash).await?;
            if let Some(message) = Message::from_value(&value) {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    pub async fn iterate_topic_messages(
        &self,
        channel_id: &ChannelId,
        topic_id: &TopicId,
    ) -> Result<Vec<Message>> {
        let all = self.iterate_messages(std::slice::from_ref(channel_id)).await?;
        Ok(all
            .into_iter()
            .filter(|m| m.topic_id == topic_id.to_string())
            .collect())
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }
}

/// Returns the last `max_count` messages of `messages`, preserving order —
/// used by the analyzer and summary builder
/// to bound how much history is sent to the LLM.
pub fn recent_window(messages: &[Message], max_count: usize) -> &[Message] {
    let start = messages.len().saturating_sub(max_count);
    &messages[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use weft_store::ObjectStore;

    async fn manager() -> (tempfile::TempDir, ChannelManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        (dir, ChannelManager::new(store))
    }

    #[tokio::test]
    async fn post_message_persists_before_appending_entry() {
        let (_dir, mgr) = manager().await;
        let channel_id = ChannelId::from("t1");
        let msg = Message::new_user(&TopicId::from("t1"), "u1", "hello");
        let hash = mgr.post_message(&channel_id, &msg).await.unwrap();

        // the referenced object must already be durable by the time the entry exists
        let stored = mgr.store().get_by_content_hash(&hash).await.unwrap();
        assert_eq!(stored["text"], "hello");

        let entries = mgr.iterate_entries(&[channel_id]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content_hash, hash);
    }

    #[tokio::test]
    async fn iteration_order_matches_append_order_within_a_channel() {
        let (_dir, mgr) = manager().await;
        let channel_id = ChannelId::from("t1");
        let topic = TopicId::from("t1");
        for text in ["first", "second", "third"] {
            let msg = Message::new_user(&topic, "u1", text);
            mgr.post_message(&channel_id, &msg).await.unwrap();
        }

        let messages = mgr.iterate_topic_messages(&channel_id, &topic).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn on_updated_fires_after_entry_is_durable() {
        let (_dir, mgr) = manager().await;
        let channel_id = ChannelId::from("t1");
        let mut rx = mgr.on_updated(&channel_id);
        let msg = Message::new_user(&TopicId::from("t1"), "u1", "hi");
        let hash = mgr.post_message(&channel_id, &msg).await.unwrap();

        let update = rx.try_recv().unwrap();
        assert_eq!(update.content_hash, hash);
        // the object referenced by the event must already be readable
        assert!(mgr.store().get_by_content_hash(&hash).await.is_ok());
    }

    #[tokio::test]
    async fn list_channel_ids_reflects_created_channels() {
        let (_dir, mgr) = manager().await;
        assert!(mgr.list_channel_ids().await.unwrap().is_empty());
        let info = mgr.create_channel().await.unwrap();
        let ids = mgr.list_channel_ids().await.unwrap();
        assert_eq!(ids, vec![info.channel_id]);
    }

    #[test]
    fn recent_window_caps_and_preserves_order() {
        let topic = TopicId::from("t1");
        let messages: Vec<Message> = (0..5)
            .map(|i| Message::new_user(&topic, "u1", format!("m{i}")))
            .collect();
        let window = recent_window(&messages, 2);
        let texts: Vec<&str> = window.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);

        // requesting more than available returns everything, unchanged order
        let window = recent_window(&messages, 100);
        assert_eq!(window.len(), 5);
    }
}
