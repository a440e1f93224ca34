//! Shared fixtures for the SDK integration tests.
//!
//! `MockTransport` replays scripted responses without touching the network,
//! records every attempt with its (tokio) timestamp, and counts how many
//! response bodies were released.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use hibana_sdk::transport::{HttpRequest, HttpResponse, Transport};
use hibana_sdk::{Client, Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;

/// One scripted transport outcome.
pub enum Reply {
    /// Respond with a status, headers and body chunks.
    Respond {
        status: u16,
        headers: HeaderMap,
        chunks: Vec<Bytes>,
    },
    /// Respond 200 with these body chunks, then never send more or close.
    Stall { chunks: Vec<Bytes> },
    /// Fail before any response arrives.
    Fail(Error),
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn json(status: u16, body: &Value) -> Self {
        Self::json_with_headers(status, body, &[])
    }

    pub fn json_with_headers(status: u16, body: &Value, headers: &[(&'static str, &str)]) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_static(*name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        Self::Respond {
            status,
            headers: map,
            chunks: vec![Bytes::from(body.to_string())],
        }
    }

    /// An SSE response delivering one event per body chunk.
    pub fn sse(payloads: &[String]) -> Self {
        Self::Respond {
            status: 200,
            headers: HeaderMap::new(),
            chunks: payloads
                .iter()
                .map(|payload| Bytes::from(format!("data: {payload}\n\n")))
                .collect(),
        }
    }

    /// An SSE response that delivers `payloads` and then goes silent.
    pub fn sse_then_stall(payloads: &[String]) -> Self {
        Self::Stall {
            chunks: payloads
                .iter()
                .map(|payload| Bytes::from(format!("data: {payload}\n\n")))
                .collect(),
        }
    }
}

/// A recorded attempt.
pub struct Recorded {
    pub request: HttpRequest,
    pub at: Instant,
}

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Recorded>>,
    closes: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|r| r.at).collect()
    }

    pub fn request_ids(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.request.header("x-request-id").unwrap_or_default().to_string())
            .collect()
    }

    pub fn last_body(&self) -> Value {
        let requests = self.requests.lock().unwrap();
        let body = requests.last().and_then(|r| r.request.body.clone()).unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Number of response bodies dropped so far.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(Recorded {
            request,
            at: Instant::now(),
        });

        let reply = self.replies.lock().unwrap().pop_front();
        match reply.expect("no scripted reply left") {
            Reply::Respond {
                status,
                headers,
                chunks,
            } => {
                let body = TrackedBody {
                    chunks: chunks.into_iter().map(Ok).collect(),
                    stall: false,
                    closes: Arc::clone(&self.closes),
                };
                Ok(HttpResponse::new(status, headers, Box::pin(body)))
            }
            Reply::Stall { chunks } => {
                let body = TrackedBody {
                    chunks: chunks.into_iter().map(Ok).collect(),
                    stall: true,
                    closes: Arc::clone(&self.closes),
                };
                Ok(HttpResponse::new(200, HeaderMap::new(), Box::pin(body)))
            }
            Reply::Fail(error) => Err(error),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

/// Body stream that counts its own release.
struct TrackedBody {
    chunks: VecDeque<Result<Bytes>>,
    stall: bool,
    closes: Arc<AtomicUsize>,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.chunks.pop_front() {
            None if self.stall => Poll::Pending,
            next => Poll::Ready(next),
        }
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn client_with(transport: &Arc<MockTransport>, max_retries: u32) -> Client {
    Client::builder()
        .api_key("test-key")
        .base_url("http://gateway.test/v1")
        .max_retries(max_retries)
        .retry_base_delay(Duration::from_secs(1))
        .retry_max_delay(Duration::from_secs(30))
        .timeout(Duration::from_secs(5))
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .build()
        .unwrap()
}

pub fn chat_body(model: &str, text: &str) -> Value {
    json!({
        "id": "chatcmpl-mock123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 13, "completion_tokens": 7, "total_tokens": 20}
    })
}

pub fn error_body(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": "invalid_request_error",
            "code": code
        }
    })
}

/// SSE payloads streaming `words` followed by a stop chunk.
pub fn delta_events(words: &[&str]) -> Vec<String> {
    let mut events: Vec<String> = words
        .iter()
        .map(|word| {
            json!({
                "id": "chatcmpl-stream",
                "object": "chat.completion.chunk",
                "choices": [{"index": 0, "delta": {"content": word}, "finish_reason": null}]
            })
            .to_string()
        })
        .collect();
    events.push(
        json!({
            "id": "chatcmpl-stream",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        })
        .to_string(),
    );
    events
}

pub fn models_body() -> Value {
    json!({
        "object": "list",
        "data": [
            {"id": "gpt-5-nano", "object": "model", "created": 1_754_000_000, "owned_by": "openai"},
            {"id": "claude-haiku-4-5", "object": "model", "created": 1_760_000_000, "owned_by": "anthropic"},
            {"id": "deepseek-chat", "object": "model", "created": 1_735_000_000, "owned_by": "deepseek"},
            {"id": "dall-e-3", "object": "model", "created": 1_698_000_000, "owned_by": "openai"}
        ]
    })
}
