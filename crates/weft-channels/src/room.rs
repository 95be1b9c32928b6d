use std::sync::Arc;
use weft_core::types::{ChannelId, TopicId};

use crate::error::Result;
use crate::manager::{ChannelManager, ChannelUpdate};
use crate::types::{Attachment, Message};

/// Thin per-topic facade over [`ChannelManager`]. A `TopicRoom`
/// is the unit other components (analyzer, summary, processor) actually
/// talk to — they never reach into a channel's full log directly.
pub struct TopicRoom {
    channel_id: ChannelId,
    topic_id: TopicId,
    manager: Arc<ChannelManager>,
}

impl TopicRoom {
    pub fn new(channel_id: ChannelId, topic_id: TopicId, manager: Arc<ChannelManager>) -> Self {
        Self {
            channel_id,
            topic_id,
            manager,
        }
    }

    pub fn id(&self) -> &TopicId {
        &self.topic_id
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn manager(&self) -> &Arc<ChannelManager> {
        &self.manager
    }

    pub async fn post_message(&self, message: &Message) -> Result<String> {
        debug_assert_eq!(message.topic_id, self.topic_id.to_string());
        self.manager.post_message(&self.channel_id, message).await
    }

    pub async fn post_text(
        &self,
        sender_id: impl Into<String>,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<(Message, String)> {
        let mut message = Message::new_user(&self.topic_id, sender_id, text);
        message.attachments = attachments;
        let content_hash = self.post_message(&message).await?;
        Ok((message, content_hash))
    }

    pub async fn iterate_messages(&self) -> Result<Vec<Message>> {
        self.manager
            .iterate_topic_messages(&self.channel_id, &self.topic_id)
            .await
    }

    pub fn on_new_message(&self) -> tokio::sync::broadcast::Receiver<ChannelUpdate> {
        self.manager.on_updated(&self.channel_id)
    }

    /// Participants are derived from the distinct set of non-AI message
    /// senders seen so far in the room; there is no separate membership
    /// list to keep in sync.
    pub async fn participants(&self) -> Result<Vec<String>> {
        let messages = self.iterate_messages().await?;
        let mut seen = std::collections::BTreeSet::new();
        for m in messages.iter().filter(|m| !m.is_ai) {
            seen.insert(m.sender_id.clone());
        }
        Ok(seen.into_iter().collect())
    }

    /// True if any message so far in the room came from an AI sender.
    pub async fn has_ai_participant(&self) -> Result<bool> {
        let messages = self.iterate_messages().await?;
        Ok(messages.iter().any(|m| m.is_ai))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_store::ObjectStore;

    async fn room() -> (tempfile::TempDir, TopicRoom) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let manager = Arc::new(ChannelManager::new(store));
        let topic = TopicId::from("t1");
        let channel = ChannelId::from("t1");
        (dir, TopicRoom::new(channel, topic, manager))
    }

    #[tokio::test]
    async fn post_text_round_trips_through_iterate_messages() {
        let (_dir, room) = room().await;
        let (posted, hash) = room.post_text("u1", "hello world", Vec::new()).await.unwrap();
        assert!(!hash.is_empty());

        let messages = room.iterate_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, posted.text);
    }

    #[tokio::test]
    async fn participants_excludes_ai_senders() {
        let (_dir, room) = room().await;
        room.post_text("u1", "hi", Vec::new()).await.unwrap();
        room.post_text("u2", "hello", Vec::new()).await.unwrap();
        let ai_msg = Message::new_assistant(room.id(), "assistant", false);
        room.post_message(&ai_msg).await.unwrap();

        let participants = room.participants().await.unwrap();
        assert_eq!(participants, vec!["u1".to_string(), "u2".to_string()]);
        assert!(room.has_ai_participant().await.unwrap());
    }

    #[tokio::test]
    async fn no_ai_participant_before_any_ai_message() {
        let (_dir, room) = room().await;
        room.post_text("u1", "hi", Vec::new()).await.unwrap();
        assert!(!room.has_ai_participant().await.unwrap());
    }
}
