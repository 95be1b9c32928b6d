use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, StreamEvent};

/// Network-free [`LlmProvider`] for analyzer/summary/processor tests. Responses are
/// queued up front with [`MockLlmProvider::push_response`] and returned in FIFO order on
/// each `chat`/`chat_stream` call; an empty queue returns an empty completion rather than
/// erroring, so tests that don't care about the exact prompt content don't need to pre-
/// seed one response per call.
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<String>>,
    context_window: u32,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            context_window: 8192,
        }
    }

    pub fn with_context_window(context_window: u32) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            context_window,
        }
    }

    /// Queues a canned completion to be returned by the next `chat` call.
    pub async fn push_response(&self, content: impl Into<String>) {
        self.responses.lock().await.push_back(content.into());
    }

    async fn next_response(&self) -> String {
        self.responses.lock().await.pop_front().unwrap_or_default()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let content = self.next_response().await;
        let tokens_in = req.messages.iter().map(|m| self.estimate_tokens(&m.content)).sum();
        let tokens_out = self.estimate_tokens(&content);
        Ok(ChatResponse {
            content,
            model: req.model.clone(),
            tokens_in,
            tokens_out,
            stop_reason: "stop".to_string(),
        })
    }

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
        for word in resp.content.split_inclusive(' ') {
            if cancel.is_cancelled() {
                return Err(ProviderError::GenerationCancelled);
            }
            if tx
                .send(StreamEvent::TextDelta { text: word.to_string() })
                .await
                .is_err()
            {
                return Ok(());
            }
        }
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

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 8];
        for (i, b) in text.bytes().enumerate() {
            v[i % 8] += b as f32;
        }
        Ok(v)
    }

    fn context_window(&self, _model: &str) -> u32 {
        self.context_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_queued_responses_in_order() {
        let provider = MockLlmProvider::new();
        provider.push_response("first").await;
        provider.push_response("second").await;

        let req = ChatRequest {
            model: "mock".into(),
            messages: vec![],
            max_tokens: 100,
            temperature: 0.0,
        };
        assert_eq!(provider.chat(&req).await.unwrap().content, "first");
        assert_eq!(provider.chat(&req).await.unwrap().content, "second");
        assert_eq!(provider.chat(&req).await.unwrap().content, "");
    }

    #[tokio::test]
    async fn chat_stream_respects_cancellation() {
        let provider = MockLlmProvider::new();
        provider.push_response("won't be seen").await;
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        token.cancel();
        let err = provider.chat_stream(
            &ChatRequest { model: "mock".into(), messages: vec![], max_tokens: 10, temperature: 0.0 },
            tx,
            token,
        ).await.unwrap_err();
        assert!(matches!(err, ProviderError::GenerationCancelled));
    }
}
