use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, Role, StreamEvent};

/// Talks to an OpenAI-compatible `/v1/chat/completions` endpoint — the
/// shape most local model servers (llama.cpp, vLLM, Ollama's OpenAI
/// shim) expose. Trimmed of tool-call and multi-vendor message
/// conversion since the single local model doesn't need either.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chat_path: String,
    embeddings_path: String,
    context_window: u32,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, context_window: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            chat_path: "/v1/chat/completions".to_string(),
            embeddings_path: "/v1/embeddings".to_string(),
            context_window,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.post(url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder.header("content-type", "application/json")
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = build_request_body(req, false);
        debug!(model = %req.model, "sending chat request");

        let resp = self.request(&self.chat_path).json(&body).send().await?;
        let resp = handle_status(resp).await?;

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let body = build_request_body(req, true);
        debug!(model = %req.model, "sending streaming chat request");

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::GenerationCancelled),
            r = self.request(&self.chat_path).json(&body).send() => r?,
        };
        let resp = handle_status(resp).await?;

        process_stream(resp, req.model.clone(), tx, cancel).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "model": "text-embedding", "input": text });
        let resp = self.request(&self.embeddings_path).json(&body).send().await?;
        let resp = handle_status(resp).await?;
        let api_resp: EmbeddingResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Parse("embeddings response carried no data".into()))
    }

    fn context_window(&self, _model: &str) -> u32 {
        self.context_window
    }
}

async fn handle_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status().as_u16();
    if status == 429 {
        let retry_after_ms = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        return Err(ProviderError::RateLimited { retry_after_ms });
    }
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!(status, body = %text, "LLM provider returned an error");
        return Err(ProviderError::ProviderUnavailable(format!("HTTP {status}: {text}")));
    }
    Ok(resp)
}

fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            serde_json::json!({ "role": role, "content": m.content })
        })
        .collect();

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
        "stream": stream,
    })
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or("")
        .to_string();
    let stop_reason = choice.and_then(|c| c.finish_reason).unwrap_or_default();

    ChatResponse {
        content,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        stop_reason,
    }
}

/// Parses a standard SSE line (`event: ...` / `data: ...`).
fn parse_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
}

async fn process_stream(
    resp: reqwest::Response,
    model: String,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    use futures_util::StreamExt;

    let mut tokens_in: u32 = 0;
    let mut tokens_out: u32 = 0;
    let mut stop_reason = String::new();
    let mut line_buf = String::new();

    let mut byte_stream = resp.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProviderError::GenerationCancelled);
            }
            next = byte_stream.next() => match next {
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
                    return Err(ProviderError::Http(e));
                }
                None => break,
            },
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };
        line_buf.push_str(text);

        let mut lines: Vec<String> = line_buf.split('\n').map(str::to_string).collect();
        let remainder = lines.pop().unwrap_or_default();

        for line in &lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(data) = parse_sse_data(line) else { continue };
            if data.trim() == "[DONE]" {
                continue;
            }
            if let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(data) {
                if let Some(usage) = &chunk_resp.usage {
                    tokens_in = usage.prompt_tokens;
                    tokens_out = usage.completion_tokens;
                }
                for choice in &chunk_resp.choices {
                    if let Some(reason) = &choice.finish_reason {
                        if !reason.is_empty() {
                            stop_reason = reason.clone();
                        }
                    }
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() && tx.send(StreamEvent::TextDelta { text: content.clone() }).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
        line_buf = remainder;
    }

    let _ = tx
        .send(StreamEvent::Done { model, tokens_in, tokens_out, stop_reason })
        .await;
    Ok(())
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
