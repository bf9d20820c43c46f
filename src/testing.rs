//! In-process stand-ins for the Gemini endpoints, shared by unit tests.

use crate::embeddings::Embedder;
use crate::error::{ChatError, Result};
use crate::llm::{ChatSession, TokenSink};
use crate::vector_db::Document;
use async_trait::async_trait;
use ndarray::Array1;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn doc(id: &str, text: &str) -> Document {
    Document {
        id: id.to_string(),
        label: id.to_uppercase(),
        text: text.to_string(),
    }
}

/// Maps known texts to fixed vectors; unknown or poisoned texts fail.
#[derive(Default)]
pub struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: &[f32]) -> Self {
        self.vectors.insert(text.to_string(), vector.to_vec());
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Array1<f32>> {
        self.calls.lock().unwrap().push(text.to_string());

        if self.failing.iter().any(|t| t == text) {
            return Err(ChatError::Embedding(format!("stub refused '{text}'")));
        }
        self.vectors
            .get(text)
            .map(|v| Array1::from(v.clone()))
            .ok_or_else(|| ChatError::Embedding(format!("no stub vector for '{text}'")))
    }
}

/// Replies with canned fragments and records every prompt it receives.
#[derive(Clone, Default)]
pub struct StubChat {
    pub fragments: Vec<String>,
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl StubChat {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatSession for StubChat {
    async fn send(&mut self, prompt: &str, on_token: Option<TokenSink<'_>>) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(ChatError::Model("stub model unavailable".to_string()));
        }

        if let Some(sink) = on_token {
            for fragment in &self.fragments {
                sink(fragment.as_str());
            }
        }
        Ok(self.fragments.concat())
    }
}

/// One scripted HTTP response.
pub enum FakeReply {
    Json(u16, Value),
    /// `text/event-stream` body; each event is written after its delay.
    Sse(Vec<(Duration, Value)>),
}

impl FakeReply {
    pub fn sse(events: &[Value]) -> Self {
        FakeReply::Sse(events.iter().map(|e| (Duration::ZERO, e.clone())).collect())
    }

    async fn write_to(&self, socket: &mut TcpStream) -> std::io::Result<()> {
        match self {
            FakeReply::Json(status, body) => {
                let body = body.to_string();
                let head = format!(
                    "HTTP/1.1 {status} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                socket.write_all(head.as_bytes()).await?;
                socket.write_all(body.as_bytes()).await?;
            }
            FakeReply::Sse(events) => {
                socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n")
                    .await?;
                socket.flush().await?;
                for (delay, event) in events {
                    tokio::time::sleep(*delay).await;
                    socket.write_all(format!("data: {event}\r\n\r\n").as_bytes()).await?;
                    socket.flush().await?;
                }
            }
        }
        socket.shutdown().await
    }
}

/// Loopback HTTP server answering one connection per scripted reply and
/// recording every request body as JSON.
pub struct FakeGemini {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeGemini {
    pub async fn start(replies: Vec<FakeReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            for reply in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = read_request_body(&mut socket).await;
                let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
                recorded.lock().unwrap().push(json);
                reply.write_to(&mut socket).await.ok();
            }
        });

        FakeGemini { base_url, requests }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request_body(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            if buf.len() >= start + length {
                return buf[start..start + length].to_vec();
            }
        }
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return Vec::new();
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
