use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use weft_analyzer::TopicAnalyzer;
use weft_channels::{ChannelManager, Message as RoomMessage, MessageFormat, MessageStatus, TopicRoom};
use weft_core::types::{ChannelId, TopicId};
use weft_graph::GraphStore;
use weft_llm::{ChatRequest, LlmProvider, Message as LlmMessage, StreamEvent};
use weft_summary::SummaryManager;

use crate::error::{ProcessorError, Result};
use crate::types::{ProcessorEvent, QueuedMessage};

/// Default welcome prompt used only to seed a greeting; the actual wording
/// comes from the configured model.
const WELCOME_PROMPT: &str = "Greet the participants and invite them to start the conversation. Keep it to one short sentence.";
const EVENT_CHANNEL_CAPACITY: usize = 256;
const IDLE_TEARDOWN: Duration = Duration::from_secs(60);
const GENERATION_MAX_TOKENS: u32 = 1024;
const GENERATION_TEMPERATURE: f32 = 0.7;
/// Delay grows by this factor per retry rather than doubling, so with the
/// default `ProcessorConfig` (base 200ms, retry_max 2) attempt 0 waits
/// 200ms and attempt 1 waits 800ms.
const BACKOFF_MULTIPLIER: u64 = 4;

/// Dependencies shared by every per-topic actor task, cloned out of
/// [`MessageProcessor`] at spawn time so the task owns everything it needs
/// without holding a reference back to the processor itself.
#[derive(Clone)]
struct ActorContext {
    channels: Arc<ChannelManager>,
    graph: Arc<GraphStore>,
    analyzer: Arc<TopicAnalyzer>,
    summary: Arc<SummaryManager>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    reserved_for_response: usize,
    retry_max: u32,
    retry_backoff_ms: u64,
    ai_sender_id: String,
    events: broadcast::Sender<ProcessorEvent>,
    active_generations: Arc<DashMap<String, CancellationToken>>,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<QueuedMessage>>>,
}

/// The scheduling core. Per-topic FIFO queues are each owned by
/// one `tokio::task`, spawned lazily on first [`Self::enqueue`] and torn
/// down after [`IDLE_TEARDOWN`] of inactivity — this is the mutual-exclusion
/// boundary: a topic's actor task is the only writer touching that topic's
/// state, so no lock is needed to serialize operations within it.
/// Single-owner state with a non-blocking forward channel, one task per
/// topic rather than one global loop, since the unit of serialization
/// here is the topic.
pub struct MessageProcessor {
    channels: Arc<ChannelManager>,
    graph: Arc<GraphStore>,
    analyzer: Arc<TopicAnalyzer>,
    summary: Arc<SummaryManager>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    reserved_for_response: usize,
    retry_max: u32,
    retry_backoff_ms: u64,
    ai_sender_id: String,
    events: broadcast::Sender<ProcessorEvent>,
    active_generations: Arc<DashMap<String, CancellationToken>>,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<QueuedMessage>>>,
}

impl MessageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channels: Arc<ChannelManager>,
        graph: Arc<GraphStore>,
        analyzer: Arc<TopicAnalyzer>,
        summary: Arc<SummaryManager>,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        reserved_for_response: usize,
        retry_max: u32,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            channels,
            graph,
            analyzer,
            summary,
            llm,
            model: model.into(),
            reserved_for_response,
            retry_max,
            retry_backoff_ms,
            ai_sender_id: "assistant".to_string(),
            events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            active_generations: Arc::new(DashMap::new()),
            queues: Arc::new(DashMap::new()),
        }
    }

    pub fn on_event(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.events.subscribe()
    }

    /// The sender id assistant-authored Messages are posted under, exposed so callers
    /// deciding whether to enqueue a welcome construct it with the same id the processor
    /// itself will use.
    pub fn ai_sender_id(&self) -> &str {
        &self.ai_sender_id
    }

    fn context(&self) -> ActorContext {
        ActorContext {
            channels: self.channels.clone(),
            graph: self.graph.clone(),
            analyzer: self.analyzer.clone(),
            summary: self.summary.clone(),
            llm: self.llm.clone(),
            model: self.model.clone(),
            reserved_for_response: self.reserved_for_response,
            retry_max: self.retry_max,
            retry_backoff_ms: self.retry_backoff_ms,
            ai_sender_id: self.ai_sender_id.clone(),
            events: self.events.clone(),
            active_generations: self.active_generations.clone(),
            queues: self.queues.clone(),
        }
    }

    /// Appends `message` to `topic_id`'s queue, spawning its actor task on first use.
    /// Never blocks: the actor drains asynchronously on its own task.
    pub fn enqueue(&self, topic_id: &TopicId, message: QueuedMessage) {
        let key = topic_id.to_string();
        let tx = self
            .queues
            .entry(key.clone())
            .or_insert_with(|| spawn_actor(topic_id.clone(), self.context()))
            .clone();

        if tx.send(message.clone()).is_err() {
            // The previous actor tore itself down between our `entry` lookup
            // and this send (idle-teardown race). Spawn a fresh one and hand
            // it the message directly.
            debug!(topic_id = %topic_id, "actor torn down mid-enqueue, respawning");
            let fresh = spawn_actor(topic_id.clone(), self.context());
            let _ = fresh.send(message);
            self.queues.insert(key, fresh);
        }
    }

    /// Fires the cancellation token for `topic_id`'s in-flight generation, if any. A no-
    /// op if nothing is streaming.
    pub fn stop_streaming(&self, topic_id: &TopicId) {
        if let Some(token) = self.active_generations.get(topic_id.as_str()) {
            token.cancel();
        }
    }
}

fn spawn_actor(topic_id: TopicId, ctx: ActorContext) -> mpsc::UnboundedSender<QueuedMessage> {
    let (tx, mut rx) = mpsc::unbounded_channel::<QueuedMessage>();
    tokio::spawn(async move {
        let channel_id = ChannelId::from(topic_id.to_string());
        let room = TopicRoom::new(channel_id, topic_id.clone(), ctx.channels.clone());
        let mut queue: VecDeque<QueuedMessage> = VecDeque::new();
        let mut last_processed_id: Option<String> = None;

        'outer: loop {
            if queue.is_empty() {
                match tokio::time::timeout(IDLE_TEARDOWN, rx.recv()).await {
                    Ok(Some(msg)) => queue.push_back(msg),
                    Ok(None) => break 'outer,
                    Err(_elapsed) => {
                        // Idle timeout. Remove ourselves, but keep draining
                        // anything that snuck in during the race.
                        ctx.queues.remove(topic_id.as_str());
                        while let Ok(msg) = rx.try_recv() {
                            queue.push_back(msg);
                        }
                        if queue.is_empty() {
                            break 'outer;
                        }
                        debug!(topic_id = %topic_id, "late enqueue raced idle teardown, continuing to drain");
                    }
                }
            }

            while let Some(msg) = queue.pop_front() {
                if let Some(id) = msg.client_msg_id() {
                    if last_processed_id.as_deref() == Some(id) {
                        debug!(topic_id = %topic_id, client_msg_id = %id, "dropping duplicate enqueue");
                        continue;
                    }
                }

                match process_one(&topic_id, &room, &ctx, msg.clone()).await {
                    Ok(()) => {
                        if let Some(id) = msg.client_msg_id() {
                            last_processed_id = Some(id.to_string());
                        }
                    }
                    Err(e) if e.is_store_fault() => {
                        error!(topic_id = %topic_id, error = %e, "store fault, aborting drain; message stays at queue head");
                        queue.push_front(msg);
                        break;
                    }
                    Err(e) => {
                        // Non-store-fault errors are already surfaced to the
                        // caller as an `ai:error` event / error Message by
                        // `process_one`; nothing left to do but log and move on.
                        warn!(topic_id = %topic_id, error = %e, "message processing finished with a non-fatal error");
                    }
                }

                while let Ok(msg) = rx.try_recv() {
                    queue.push_back(msg);
                }
            }
        }
        debug!(topic_id = %topic_id, "actor idle, tearing down");
    });
    tx
}

async fn process_one(
    topic_id: &TopicId,
    room: &TopicRoom,
    ctx: &ActorContext,
    msg: QueuedMessage,
) -> Result<()> {
    match msg {
        QueuedMessage::Welcome { ai_sender_id } => generate_welcome(topic_id, room, ctx, &ai_sender_id).await,
        QueuedMessage::User { sender_id, text, .. } => {
            room.post_text(sender_id.clone(), text, vec![]).await?;
            run_analysis(topic_id, ctx).await?;

            let has_ai = room.has_ai_participant().await?;
            if has_ai && sender_id != ctx.ai_sender_id {
                generate_ai_response(topic_id, room, ctx).await?;
            }
            Ok(())
        }
    }
}

async fn run_analysis(topic_id: &TopicId, ctx: &ActorContext) -> Result<()> {
    let report = ctx.analyzer.analyze(topic_id).await?;
    if report.keywords_written > 0 {
        let _ = ctx.events.send(ProcessorEvent::KeywordsUpdated { topic_id: topic_id.to_string() });
    }
    if report.subjects_written > 0 {
        let _ = ctx.events.send(ProcessorEvent::SubjectsUpdated { topic_id: topic_id.to_string() });
    }
    Ok(())
}

async fn generate_welcome(topic_id: &TopicId, room: &TopicRoom, ctx: &ActorContext, ai_sender_id: &str) -> Result<()> {
    let req = ChatRequest {
        model: ctx.model.clone(),
        messages: vec![LlmMessage::system(WELCOME_PROMPT)],
        max_tokens: GENERATION_MAX_TOKENS,
        temperature: GENERATION_TEMPERATURE,
    };

    match retry_chat(ctx, &req).await {
        Ok(response) => {
            let mut message = RoomMessage::new_assistant(topic_id, ai_sender_id, true);
            message.text = response.content;
            message.format = MessageFormat::Plain;
            message.status = MessageStatus::Complete;
            room.post_message(&message).await?;
            let _ = ctx.events.send(ProcessorEvent::MessageUpdated {
                topic_id: topic_id.to_string(),
                message: message.to_value(),
            });
            Ok(())
        }
        Err(e) => {
            persist_error_message(topic_id, room, ctx, ai_sender_id, true, &e.to_string()).await?;
            Ok(())
        }
    }
}

async fn generate_ai_response(topic_id: &TopicId, room: &TopicRoom, ctx: &ActorContext) -> Result<()> {
    let messages = room.iterate_messages().await?;
    let prompt = build_prompt(topic_id, ctx, &messages).await?;

    let req = ChatRequest {
        model: ctx.model.clone(),
        messages: prompt,
        max_tokens: GENERATION_MAX_TOKENS,
        temperature: GENERATION_TEMPERATURE,
    };

    let token = CancellationToken::new();
    ctx.active_generations.insert(topic_id.to_string(), token.clone());
    let message_id = uuid::Uuid::new_v4().to_string();

    let result = retry_chat_stream(topic_id, &message_id, ctx, &req, token.clone()).await;
    ctx.active_generations.remove(topic_id.as_str());

    match result {
        Ok(text) => {
            let mut message = RoomMessage::new_assistant(topic_id, ctx.ai_sender_id.clone(), false);
            message.text = text;
            message.status = MessageStatus::Complete;
            room.post_message(&message).await?;
            let _ = ctx.events.send(ProcessorEvent::MessageUpdated {
                topic_id: topic_id.to_string(),
                message: message.to_value(),
            });
            run_analysis(topic_id, ctx).await?;
            Ok(())
        }
        Err(GenerationOutcome::Cancelled) => {
            debug!(topic_id = %topic_id, "generation cancelled, discarding partial output");
            Ok(())
        }
        Err(GenerationOutcome::Failed(msg)) => {
            persist_error_message(topic_id, room, ctx, &ctx.ai_sender_id, false, &msg).await?;
            let _ = ctx.events.send(ProcessorEvent::AiError { topic_id: topic_id.to_string(), error: msg });
            Ok(())
        }
    }
}

async fn persist_error_message(
    topic_id: &TopicId,
    room: &TopicRoom,
    ctx: &ActorContext,
    sender_id: &str,
    welcome: bool,
    error: &str,
) -> Result<()> {
    let mut message = RoomMessage::new_assistant(topic_id, sender_id, welcome);
    message.text = format!("Something went wrong generating a response: {error}");
    message.status = MessageStatus::Error;
    room.post_message(&message).await?;
    let _ = ctx.events.send(ProcessorEvent::MessageUpdated {
        topic_id: topic_id.to_string(),
        message: message.to_value(),
    });
    Ok(())
}

/// Builds the prompt for a response: a restart context (summary + recent turns) when the
/// full history no longer fits the window, otherwise the whole history verbatim.
async fn build_prompt(topic_id: &TopicId, ctx: &ActorContext, messages: &[RoomMessage]) -> Result<Vec<LlmMessage>> {
    if ctx.summary.fits_context_window(ctx.llm.as_ref(), &ctx.model, ctx.reserved_for_response, messages) {
        return Ok(messages
            .iter()
            .map(|m| if m.is_ai { LlmMessage::assistant(m.text.clone()) } else { LlmMessage::user(m.text.clone()) })
            .collect());
    }

    let restart = ctx.summary.build_restart_context(topic_id).await?;
    Ok(vec![LlmMessage::system(restart.system_message), LlmMessage::user(restart.user_context)])
}

enum GenerationOutcome {
    Cancelled,
    Failed(String),
}

async fn retry_chat(ctx: &ActorContext, req: &ChatRequest) -> std::result::Result<weft_llm::ChatResponse, weft_llm::ProviderError> {
    let mut attempt = 0;
    loop {
        match ctx.llm.chat(req).await {
            Ok(resp) => return Ok(resp),
            Err(e) if attempt < ctx.retry_max => {
                let delay_ms = ctx.retry_backoff_ms * BACKOFF_MULTIPLIER.pow(attempt);
                warn!(attempt, delay_ms, error = %e, "llm call failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Streams one generation attempt with retry, forwarding each delta as a
/// [`ProcessorEvent::MessageStream`] as it arrives. A cancellation is never retried; it
/// bubbles immediately.
async fn retry_chat_stream(
    topic_id: &TopicId,
    message_id: &str,
    ctx: &ActorContext,
    req: &ChatRequest,
    cancel: CancellationToken,
) -> std::result::Result<String, GenerationOutcome> {
    let mut attempt = 0;
    loop {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(32);
        let llm = ctx.llm.clone();
        let req_owned = req.clone();
        let cancel_owned = cancel.clone();
        let handle = tokio::spawn(async move { llm.chat_stream(&req_owned, tx, cancel_owned).await });

        let mut accumulated = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } => {
                    accumulated.push_str(&text);
                    let _ = ctx.events.send(ProcessorEvent::MessageStream {
                        topic_id: topic_id.to_string(),
                        message_id: message_id.to_string(),
                        chunk: text,
                    });
                }
                StreamEvent::Done { .. } => {}
                StreamEvent::Error { message } => {
                    warn!(topic_id = %topic_id, error = %message, "provider reported a stream error");
                }
            }
        }

        let call_result = match handle.await {
            Ok(r) => r,
            Err(join_err) => return Err(GenerationOutcome::Failed(join_err.to_string())),
        };

        match call_result {
            Ok(()) => return Ok(accumulated),
            Err(weft_llm::ProviderError::GenerationCancelled) => return Err(GenerationOutcome::Cancelled),
            Err(e) if attempt < ctx.retry_max => {
                let delay_ms = ctx.retry_backoff_ms * BACKOFF_MULTIPLIER.pow(attempt);
                warn!(attempt, delay_ms, error = %e, "streaming llm call failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(GenerationOutcome::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_channels::ChannelManager;
    use weft_graph::GraphStore;
    use weft_llm::MockLlmProvider;
    use weft_store::ObjectStore;
    use weft_summary::SummaryManager;

    async fn harness(
        dir: &std::path::Path,
    ) -> (
        Arc<ChannelManager>,
        Arc<GraphStore>,
        Arc<TopicAnalyzer>,
        Arc<SummaryManager>,
        Arc<MockLlmProvider>,
    ) {
        let store = Arc::new(ObjectStore::open(dir).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), channels.clone(), 0));
        let llm = Arc::new(MockLlmProvider::new());
        let analyzer = Arc::new(TopicAnalyzer::new(
            channels.clone(),
            graph.clone(),
            llm.clone(),
            "mock-model",
        ));
        let summary = Arc::new(SummaryManager::new(
            store.clone(),
            channels.clone(),
            graph.clone(),
            analyzer.clone(),
            6,
        ));
        (channels, graph, analyzer, summary, llm)
    }

    #[tokio::test]
    async fn welcome_message_is_posted_and_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let (channels, graph, analyzer, summary, llm) = harness(dir.path()).await;
        llm.push_response("Hi everyone, welcome!").await;

        let processor = MessageProcessor::new(
            channels.clone(),
            graph,
            analyzer,
            summary,
            llm,
            "mock-model",
            2_000,
            2,
            10,
        );
        let mut events = processor.on_event();
        let topic = TopicId::from("t-welcome");
        processor.enqueue(
            &topic,
            QueuedMessage::Welcome {
                ai_sender_id: "assistant".to_string(),
            },
        );

        let mut saw_welcome = false;
        for _ in 0..50 {
            if let Ok(Ok(ProcessorEvent::MessageUpdated { message, .. })) =
                tokio::time::timeout(Duration::from_millis(200), events.recv()).await
            {
                if message.get("text").and_then(|t| t.as_str()) == Some("Hi everyone, welcome!") {
                    saw_welcome = true;
                    break;
                }
            }
        }
        assert!(saw_welcome, "expected a MessageUpdated event with the welcome text");

        let channel_id = ChannelId::from(topic.to_string());
        let room = TopicRoom::new(channel_id, topic, channels);
        let messages = room.iterate_messages().await.unwrap();
        assert!(messages.iter().any(|m| m.is_ai && m.text == "Hi everyone, welcome!"));
    }

    #[tokio::test]
    async fn ai_response_is_generated_when_ai_participant_present() {
        let dir = tempfile::tempdir().unwrap();
        let (channels, graph, analyzer, summary, llm) = harness(dir.path()).await;

        let topic = TopicId::from("t-reply");
        let channel_id = ChannelId::from(topic.to_string());
        let room = TopicRoom::new(channel_id, topic.clone(), channels.clone());
        let mut welcome = RoomMessage::new_assistant(&topic, "assistant", true);
        welcome.text = "hello".to_string();
        welcome.status = MessageStatus::Complete;
        room.post_message(&welcome).await.unwrap();

        llm.push_response(r#"{"keywords":[],"subjects":[]}"#).await; // analysis after the user turn
        llm.push_response("Hello there!").await; // assistant reply
        llm.push_response(r#"{"keywords":[],"subjects":[]}"#).await; // analysis after the reply

        let processor = MessageProcessor::new(
            channels.clone(),
            graph,
            analyzer,
            summary,
            llm,
            "mock-model",
            2_000,
            2,
            10,
        );
        let mut events = processor.on_event();
        processor.enqueue(
            &topic,
            QueuedMessage::User {
                client_msg_id: Some("m1".to_string()),
                sender_id: "u1".to_string(),
                text: "hi there".to_string(),
            },
        );

        let mut saw_reply = false;
        for _ in 0..75 {
            if let Ok(Ok(ProcessorEvent::MessageUpdated { message, .. })) =
                tokio::time::timeout(Duration::from_millis(200), events.recv()).await
            {
                if message.get("text").and_then(|t| t.as_str()) == Some("Hello there!") {
                    saw_reply = true;
                    break;
                }
            }
        }
        assert!(saw_reply, "expected the assistant reply to be posted and broadcast");

        let messages = room.iterate_messages().await.unwrap();
        assert!(messages.iter().any(|m| m.is_ai && m.text == "Hello there!"));
    }

    #[tokio::test]
    async fn duplicate_client_msg_id_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (channels, graph, analyzer, summary, llm) = harness(dir.path()).await;
        llm.push_response(r#"{"keywords":[],"subjects":[]}"#).await;

        let topic = TopicId::from("t-dedup");
        let processor = MessageProcessor::new(
            channels.clone(),
            graph,
            analyzer,
            summary,
            llm,
            "mock-model",
            2_000,
            2,
            10,
        );
        processor.enqueue(
            &topic,
            QueuedMessage::User {
                client_msg_id: Some("dup".to_string()),
                sender_id: "u1".to_string(),
                text: "hello".to_string(),
            },
        );
        processor.enqueue(
            &topic,
            QueuedMessage::User {
                client_msg_id: Some("dup".to_string()),
                sender_id: "u1".to_string(),
                text: "hello again".to_string(),
            },
        );

        tokio::time::sleep(Duration::from_millis(500)).await;

        let channel_id = ChannelId::from(topic.to_string());
        let room = TopicRoom::new(channel_id, topic, channels);
        let messages = room.iterate_messages().await.unwrap();
        assert_eq!(messages.len(), 1, "the duplicate enqueue must not be persisted twice");
    }

    #[tokio::test]
    async fn stop_streaming_without_an_active_generation_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (channels, graph, analyzer, summary, llm) = harness(dir.path()).await;
        let processor = MessageProcessor::new(
            channels, graph, analyzer, summary, llm, "mock-model", 2_000, 2, 10,
        );
        processor.stop_streaming(&TopicId::from("nothing-running"));
    }
}
