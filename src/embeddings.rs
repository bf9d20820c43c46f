//! Text embeddings through the Gemini `embedContent` endpoint.

use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::llm::{api_error_message, http_client};
use async_trait::async_trait;
use ndarray::Array1;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Turns text into a fixed-length vector.
///
/// Implementations must return an error instead of a placeholder vector when
/// the call fails; a wrong vector would silently skew every score.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Array1<f32>>;
}

pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_api_key()?.to_string();
        Ok(Self {
            client: http_client(settings)?,
            api_key,
            base_url: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            timeout: settings.request_timeout(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:embedContent", self.base_url, self.model)
    }

    fn request<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
        }
    }
}

fn parse_embedding(body: &str) -> Result<Array1<f32>> {
    let response: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::Embedding(format!("unexpected response ({e})")))?;

    if response.embedding.values.is_empty() {
        return Err(ChatError::Embedding("empty embedding returned".to_string()));
    }
    Ok(Array1::from(response.embedding.values))
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Array1<f32>> {
        debug!("Embedding {} chars with {}", text.len(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request(text))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ChatError::Embedding(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Embedding(e.to_string()))?;

        if !status.is_success() {
            return Err(ChatError::Embedding(format!(
                "{} ({})",
                api_error_message(&body),
                status
            )));
        }

        let vector = parse_embedding(&body)?;
        debug!("Received {}-dimensional embedding", vector.len());
        Ok(vector)
    }
}
