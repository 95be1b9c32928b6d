use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a chat prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Request to the configured LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Non-streaming response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Events emitted while streaming a chat completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta { text: String },
    Done { model: String, tokens_in: u32, tokens_out: u32, stop_reason: String },
    Error { message: String },
}

/// Common interface every LLM backend implements. The engine
/// only ever talks to the configured local model through this trait —
/// swapping providers never touches `weft-analyzer`, `weft-summary`, or
/// `weft-processor`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Streams a chat completion through `tx`, observing `cancel`. Default
    /// implementation falls back to [`Self::chat`] and replays it as a
    /// single `TextDelta` + `Done` — providers that support real
    /// server-sent streaming override this.
    async fn chat_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ProviderError::GenerationCancelled);
        }
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::GenerationCancelled),
            r = self.chat(req) => r?,
        };
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }

    /// Embeds `text` into a dense vector, used by the analyzer's fuzzy-merge
    /// step when Levenshtein distance alone is inconclusive. Providers that
    /// don't expose embeddings return [`ProviderError::ProviderUnavailable`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Cheap token-count heuristic (chars/4, ±10% tolerance)
    /// used for context-window bookkeeping without a round trip.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.chars().count() as u32).div_ceil(4)
    }

    /// Usable context window for `model`, in tokens.
    fn context_window(&self, model: &str) -> u32;
}
