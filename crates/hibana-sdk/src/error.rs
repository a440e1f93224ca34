//! Error types for the Hibana SDK.
//!
//! Every failure surfaces as a single [`Error`] value tagged with an
//! [`ErrorKind`]. Callers match on the kind instead of on a type hierarchy;
//! the gateway's status code, error code and request id travel along for
//! diagnostics.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, malformed or rejected credential (HTTP 401/403).
    Authentication,
    /// Unknown model or resource (HTTP 404).
    NotFound,
    /// Parameters rejected locally or by the gateway (HTTP 400 and other 4xx).
    InvalidRequest,
    /// Too many requests (HTTP 429).
    RateLimited,
    /// The account balance cannot cover the request.
    InsufficientBalance,
    /// The gateway or an upstream provider failed (HTTP 5xx).
    Server,
    /// DNS, connect, TLS, timeout or a connection dropped mid-body.
    Transport,
    /// A successful response whose body could not be decoded.
    Decode,
    /// The client itself is misconfigured.
    Configuration,
}

impl ErrorKind {
    /// Whether the retry policy may re-issue a request that failed this way.
    ///
    /// Only rate limiting and server failures qualify; transport failures
    /// are left to the caller.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Server)
    }

    /// Stable snake_case name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::InsufficientBalance => "insufficient_balance",
            Self::Server => "server",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::Configuration => "configuration",
        }
    }

    /// Map an HTTP status code to a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            402 => Self::InsufficientBalance,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            400..=499 => Self::InvalidRequest,
            _ => Self::Server,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every SDK operation.
#[derive(Error, Debug)]
#[error("{kind} error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    code: Option<String>,
    param: Option<String>,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
            param: None,
            request_id: None,
            retry_after: None,
            source: None,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an invalid request error naming the violated parameter.
    pub fn invalid_request(param: impl Into<String>, message: impl Into<String>) -> Self {
        let mut error = Self::new(ErrorKind::InvalidRequest, message);
        error.param = Some(param.into());
        error
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Create a timeout error for an attempt bounded by `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::transport(format!("request timed out after {}ms", timeout.as_millis()))
    }

    /// Build an error from a non-success gateway response.
    ///
    /// The body is parsed as an OpenAI-style `{"error": {...}}` envelope when
    /// possible; otherwise the raw text becomes the message.
    pub fn from_response(
        status: u16,
        body: &[u8],
        request_id: Option<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        let mut kind = ErrorKind::from_status(status);

        let (message, code, param) = match serde_json::from_slice::<ApiErrorResponse>(body) {
            Ok(envelope) => {
                let detail = envelope.error;
                let code = detail.code_string().or(detail.error_type);
                (detail.message, code, detail.param)
            }
            Err(_) => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                let message = if text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    text
                };
                (message, None, None)
            }
        };

        if code.as_deref().is_some_and(is_balance_code) {
            kind = ErrorKind::InsufficientBalance;
        }

        Self {
            kind,
            message,
            status: Some(status),
            code,
            param,
            request_id,
            retry_after,
            source: None,
        }
    }

    /// Recognize an error event sent in place of a chunk on an open stream.
    pub(crate) fn from_stream_event(payload: &str) -> Option<Self> {
        let detail = serde_json::from_str::<ApiErrorResponse>(payload).ok()?.error;
        let code = detail.code_string().or(detail.error_type);
        let kind = if code.as_deref().is_some_and(is_balance_code) {
            ErrorKind::InsufficientBalance
        } else {
            ErrorKind::Server
        };

        let mut error = Self::new(kind, detail.message);
        error.code = code;
        error.param = detail.param;
        Some(error)
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a request id, keeping one the gateway already reported.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        if self.request_id.is_none() {
            self.request_id = Some(request_id.into());
        }
        self
    }

    /// The error classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message, passed through from the gateway when present.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code, when the gateway answered.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Machine-readable error code reported by the gateway.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The request parameter that was rejected, if known.
    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }

    /// Request id for correlating with gateway logs.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Server-provided `Retry-After` hint.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Check if the error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_builder() {
            ErrorKind::Configuration
        } else if error.is_decode() {
            ErrorKind::Decode
        } else {
            ErrorKind::Transport
        };
        let message = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            "failed to connect to gateway".to_string()
        } else {
            error.to_string()
        };
        Self::new(kind, message).with_source(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(format!("invalid JSON: {error}")).with_source(error)
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Self::configuration(format!("invalid URL: {error}")).with_source(error)
    }
}

fn is_balance_code(code: &str) -> bool {
    matches!(code, "insufficient_balance" | "insufficient_quota" | "insufficient_funds")
}

/// Error response from the API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Detailed error information from the API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Providers disagree on whether this is a string or a number.
    pub code: Option<serde_json::Value>,
    pub param: Option<String>,
}

impl ApiErrorDetail {
    fn code_string(&self) -> Option<String> {
        match self.code.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
