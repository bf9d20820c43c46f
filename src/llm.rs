use crate::config::Settings;
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

/// Receives streamed text fragments in arrival order.
pub type TokenSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// One conversation with the model. Sending a turn appends it to the history
/// only when the model answered.
#[async_trait]
pub trait ChatSession: Send {
    async fn send(&mut self, prompt: &str, on_token: Option<TokenSink<'_>>) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 40,
            top_p: 0.9,
            max_output_tokens: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Part {
    text: String,
}

impl Content {
    fn user(text: &str) -> Self {
        Self::with_role("user", text)
    }

    fn model(text: &str) -> Self {
        Self::with_role("model", text)
    }

    fn with_role(role: &'static str, text: &str) -> Self {
        Content {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [PartRef<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PartRef<'a> {
    text: &'a str,
}

/// Text of one model turn and the reason generation stopped, when reported.
#[derive(Debug, Default)]
struct Reply {
    text: String,
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: &'a GenerationConfig,
}

/// Chat session against the Gemini `generateContent` API.
pub struct GeminiChat {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    system_instruction: String,
    generation: GenerationConfig,
    history: Vec<Content>,
}

impl GeminiChat {
    pub fn new(
        settings: &Settings,
        system_instruction: &str,
        generation: GenerationConfig,
    ) -> Result<Self> {
        let api_key = settings.require_api_key()?.to_string();
        Ok(GeminiChat {
            client: http_client(settings)?,
            api_key,
            base_url: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.chat_model.clone(),
            timeout: settings.request_timeout(),
            system_instruction: system_instruction.trim().to_string(),
            generation,
            history: Vec::new(),
        })
    }

    fn endpoint(&self, streaming: bool) -> String {
        if streaming {
            format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, self.model)
        } else {
            format!("{}/models/{}:generateContent", self.base_url, self.model)
        }
    }

    fn request_body(&self, contents: &[Content]) -> Result<Value> {
        let system_instruction = (!self.system_instruction.is_empty()).then(|| SystemInstruction {
            parts: [PartRef {
                text: &self.system_instruction,
            }],
        });

        let request = GenerateRequest {
            contents,
            system_instruction,
            generation_config: &self.generation,
        };
        Ok(serde_json::to_value(request)?)
    }

    /// Streamed calls are bounded per chunk in `stream`, not as a whole, so a
    /// long answer that keeps arriving is never cut off.
    async fn post(&self, streaming: bool, body: &Value) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(self.endpoint(streaming))
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if !streaming {
            request = request.timeout(self.timeout);
        }

        let response = time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| timed_out(self.timeout))?
            .map_err(|e| ChatError::Model(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Model(format!(
                "{} ({})",
                api_error_message(&body),
                status
            )));
        }
        Ok(response)
    }

    async fn complete(&self, body: &Value) -> Result<Reply> {
        let text = self
            .post(false, body)
            .await?
            .text()
            .await
            .map_err(|e| ChatError::Model(e.to_string()))?;

        let payload: Value = serde_json::from_str(&text)?;
        check_payload(&payload)?;
        Ok(Reply {
            text: candidate_text(&payload).unwrap_or_default(),
            finish_reason: finish_reason(&payload),
        })
    }

    async fn stream(&self, body: &Value, sink: TokenSink<'_>) -> Result<Reply> {
        let mut stream = self.post(true, body).await?.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut reply = Reply::default();

        loop {
            let next = time::timeout(self.timeout, stream.next())
                .await
                .map_err(|_| timed_out(self.timeout))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| ChatError::Model(e.to_string()))?;
            for data in decoder.push(&chunk) {
                forward_fragment(&data, &mut reply, sink)?;
            }
        }
        if let Some(data) = decoder.finish() {
            forward_fragment(&data, &mut reply, sink)?;
        }

        Ok(reply)
    }
}

fn forward_fragment<F>(data: &str, reply: &mut Reply, sink: &mut F) -> Result<()>
where
    F: FnMut(&str) + ?Sized,
{
    let payload: Value = serde_json::from_str(data)?;
    check_payload(&payload)?;
    if let Some(text) = candidate_text(&payload) {
        if !text.is_empty() {
            sink(&text);
            reply.text.push_str(&text);
        }
    }
    if let Some(reason) = finish_reason(&payload) {
        reply.finish_reason = Some(reason);
    }
    Ok(())
}

fn timed_out(limit: Duration) -> ChatError {
    ChatError::Model(format!("no response within {}s", limit.as_secs()))
}

#[async_trait]
impl ChatSession for GeminiChat {
    async fn send(&mut self, prompt: &str, on_token: Option<TokenSink<'_>>) -> Result<String> {
        let mut contents = self.history.clone();
        contents.push(Content::user(prompt));
        let body = self.request_body(&contents)?;

        debug!(
            "Sending turn {} to {} ({} chars)",
            self.history.len() / 2 + 1,
            self.model,
            prompt.len()
        );

        let reply = match on_token {
            Some(sink) => self.stream(&body, sink).await?,
            None => self.complete(&body).await?,
        };

        // Gemini rejects a history that contains an empty text part.
        if reply.text.is_empty() {
            let reason = reply.finish_reason.as_deref().unwrap_or("none");
            warn!("Model returned an empty reply (finishReason {reason})");
            return Err(ChatError::Model(format!("empty reply (finishReason {reason})")));
        }

        self.history.push(Content::user(prompt));
        self.history.push(Content::model(&reply.text));
        Ok(reply.text)
    }
}

/// Shared HTTP client. Only connecting is bounded here; callers put their own
/// limit on each request.
pub fn http_client(settings: &Settings) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(settings.request_timeout())
        .build()?)
}

/// Pulls `error.message` out of a Google API error body, falling back to the
/// raw body.
pub fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn check_payload(payload: &Value) -> Result<()> {
    if let Some(message) = payload["error"]["message"].as_str() {
        return Err(ChatError::Model(message.to_string()));
    }
    if let Some(reason) = payload["promptFeedback"]["blockReason"].as_str() {
        return Err(ChatError::Model(format!("prompt blocked ({reason})")));
    }
    Ok(())
}

fn finish_reason(payload: &Value) -> Option<String> {
    payload["candidates"][0]["finishReason"]
        .as_str()
        .map(str::to_string)
}

fn candidate_text(payload: &Value) -> Option<String> {
    let parts = payload["candidates"][0]["content"]["parts"].as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<String>(),
    )
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Network chunks may split a line (or a UTF-8 sequence) anywhere, so bytes
/// are buffered until a newline arrives. Each blank line completes an event
/// whose `data:` lines are joined with `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }

        events
    }

    /// Flushes an event left unterminated at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            if let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}
