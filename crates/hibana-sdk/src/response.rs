//! Response types for the Hibana SDK.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// Natural end of the reply or a stop sequence.
    Stop,
    /// `max_tokens` was reached.
    Length,
    /// Output was withheld by a content filter.
    ContentFilter,
    /// Any other reason reported by the upstream provider.
    Other(String),
}

impl FinishReason {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::Other(reason) => reason,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for FinishReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Number of tokens in the completion.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total number of tokens.
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Create new usage statistics.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Check if any tokens were used.
    pub fn has_usage(&self) -> bool {
        self.total_tokens > 0
    }
}

impl std::ops::Add for Usage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Result of a non-streaming chat completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionResult {
    /// Completion id assigned by the gateway.
    pub id: String,
    /// Model that served the request.
    pub model: String,
    /// Text of the first choice.
    pub text: String,
    /// Why generation stopped, if reported.
    pub finish_reason: Option<FinishReason>,
    /// Token usage, if reported.
    pub usage: Option<Usage>,
}

impl CompletionResult {
    /// Check if the response was completed normally.
    pub fn is_complete(&self) -> bool {
        self.finish_reason == Some(FinishReason::Stop)
    }

    /// Check if the response was truncated due to length.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason == Some(FinishReason::Length)
    }

    /// Get the total number of tokens used.
    pub fn total_tokens(&self) -> Option<u32> {
        self.usage.map(|u| u.total_tokens)
    }

    /// Decode the text as JSON, for replies produced in JSON mode.
    ///
    /// Some models wrap JSON in a Markdown code fence; the fence is removed
    /// before decoding.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(strip_code_fence(&self.text)).map_err(|e| {
            Error::decode(format!("reply is not valid JSON: {e}")).with_source(e)
        })
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Where a generated image can be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Hosted URL; typically expires after a short period.
    Url(String),
    /// Base64-encoded image bytes.
    Base64(String),
}

/// One generated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    /// Image location or inline data.
    pub source: ImageSource,
    /// Prompt as rewritten by the model, if it did so.
    pub revised_prompt: Option<String>,
}

impl GeneratedImage {
    /// Hosted URL, if the image was delivered by reference.
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            ImageSource::Url(url) => Some(url),
            ImageSource::Base64(_) => None,
        }
    }

    /// Decode inline image data.
    ///
    /// Returns `Ok(None)` for images delivered by URL.
    pub fn decode_inline(&self) -> Result<Option<Vec<u8>>> {
        match &self.source {
            ImageSource::Url(_) => Ok(None),
            ImageSource::Base64(data) => base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map(Some)
                .map_err(|e| Error::decode(format!("invalid base64 image data: {e}")).with_source(e)),
        }
    }
}

/// Result of an image generation request, in gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    /// Creation time reported by the gateway.
    pub created_at: Option<DateTime<Utc>>,
    /// Generated images.
    pub images: Vec<GeneratedImage>,
}

impl ImageResult {
    /// Number of images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether no image was returned.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Broad family of a model, inferred from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    /// Chat or text completion model.
    Chat,
    /// Image generation model.
    Image,
    /// Anything else (embeddings, audio, ...).
    Other,
}

impl fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Image => write!(f, "image"),
            Self::Other => write!(f, "other"),
        }
    }
}

const CHAT_MODEL_FAMILIES: &[&str] = &["gpt", "claude", "deepseek", "gemini"];
const IMAGE_MODEL_FAMILIES: &[&str] = &["dall-e", "dalle"];

/// Information about a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Organization or provider that owns the model.
    pub owned_by: String,
    /// When the model was published, if reported.
    pub created_at: Option<DateTime<Utc>>,
}

impl ModelInfo {
    /// Categorize the model by well-known id prefixes.
    pub fn category(&self) -> ModelCategory {
        let id = self.id.to_ascii_lowercase();
        if IMAGE_MODEL_FAMILIES.iter().any(|family| id.contains(family)) {
            ModelCategory::Image
        } else if CHAT_MODEL_FAMILIES.iter().any(|family| id.contains(family)) {
            ModelCategory::Chat
        } else {
            ModelCategory::Other
        }
    }
}

/// Health of an account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    /// More than [`BalanceInfo::HEALTHY_THRESHOLD`].
    Healthy,
    /// More than [`BalanceInfo::LOW_THRESHOLD`].
    Low,
    /// Recharge needed.
    Critical,
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Low => write!(f, "low"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Account balance in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceInfo {
    /// Balance amount.
    pub amount: i64,
    /// ISO-like currency code, `IRR` unless the gateway says otherwise.
    pub currency: String,
}

impl BalanceInfo {
    /// Currency assumed when the gateway omits one.
    pub const DEFAULT_CURRENCY: &'static str = "IRR";
    /// Balances above this are healthy.
    pub const HEALTHY_THRESHOLD: i64 = 10_000;
    /// Balances above this (and not healthy) are low.
    pub const LOW_THRESHOLD: i64 = 1_000;

    /// Classify the balance.
    pub fn status(&self) -> BalanceStatus {
        if self.amount > Self::HEALTHY_THRESHOLD {
            BalanceStatus::Healthy
        } else if self.amount > Self::LOW_THRESHOLD {
            BalanceStatus::Low
        } else {
            BalanceStatus::Critical
        }
    }

    /// Number of requests the balance covers at `cost_per_request`.
    ///
    /// Returns `None` for a non-positive cost.
    pub fn estimated_requests(&self, cost_per_request: i64) -> Option<i64> {
        (cost_per_request > 0).then(|| self.amount.max(0) / cost_per_request)
    }

    /// Whether the balance is at least `minimum`.
    pub fn covers(&self, minimum: i64) -> bool {
        self.amount >= minimum
    }
}

impl fmt::Display for BalanceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", group_thousands(self.amount), self.currency)
    }
}

/// Format an integer with `,` thousands separators.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
