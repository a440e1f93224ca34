//! HTTP transport seam.
//!
//! The client never talks to `reqwest` directly; every exchange goes through
//! a [`Transport`], so tests and embedders can substitute their own.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Method;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Response body delivered incrementally.
///
/// Dropping the stream releases the underlying connection.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Header carrying the per-attempt correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A fully prepared outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute endpoint URL.
    pub url: Url,
    /// Request headers, authorization included.
    pub headers: HeaderMap,
    /// Serialized JSON body, if any.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Status line and headers of a response, with the body still unread.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: BodyStream,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(status: u16, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request id echoed by the gateway.
    pub fn request_id(&self) -> Option<String> {
        self.header(REQUEST_ID_HEADER).map(String::from)
    }

    /// Parse the `Retry-After` header, in delta-seconds or HTTP-date form.
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
        if let Ok(secs) = value.parse::<f64>() {
            return (secs.is_finite() && secs >= 0.0)
                .then(|| Duration::from_secs_f64(secs.min(f64::from(u32::MAX))));
        }
        let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
        (at.with_timezone(&chrono::Utc) - chrono::Utc::now()).to_std().ok()
    }

    /// Read the whole body into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends one HTTP request and returns the response head with a lazy body.
///
/// Implementations must not retry and must not enforce the overall request
/// timeout; the client does both.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Default transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport honoring the connect timeout and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(Error::from));

        Ok(HttpResponse::new(status, headers, Box::pin(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response_with(headers: HeaderMap, chunks: Vec<&'static str>) -> HttpResponse {
        let body = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, Error>(Bytes::from_static(c.as_bytes()))),
        );
        HttpResponse::new(200, headers, Box::pin(body))
    }

    #[tokio::test]
    async fn test_bytes_concatenates_chunks() {
        let response = response_with(HeaderMap::new(), vec!["{\"bal", "ance\": 1}"]);
        assert!(response.is_success());
        let body = response.bytes().await.unwrap();
        assert_eq!(&body[..], b"{\"balance\": 1}");
    }

    #[tokio::test]
    async fn test_bytes_surfaces_body_error() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::transport("connection reset")),
        ]);
        let response = HttpResponse::new(200, HeaderMap::new(), Box::pin(body));
        let err = response.bytes().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-9"));
        let response = response_with(headers, vec![]);

        assert_eq!(response.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(response.request_id().as_deref(), Some("req-9"));
    }

    #[test]
    fn test_retry_after_invalid_or_past() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(response_with(headers, vec![]).retry_after(), None);

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(response_with(headers, vec![]).retry_after(), None);
    }
}
