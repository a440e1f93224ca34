//! Request types for the Hibana SDK.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message that sets the behavior of the assistant.
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: Role,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Output format the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form text.
    Text,
    /// A single valid JSON object (JSON mode).
    JsonObject,
}

/// Request for chat completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model to use for completion.
    pub model: String,
    /// Messages in the conversation, oldest first.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Top-p sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Seed for deterministic sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Stream the response.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    /// Requested output format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl CompletionRequest {
    /// Default sampling temperature.
    pub const DEFAULT_TEMPERATURE: f32 = 1.0;

    /// Create a new chat request.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: None,
            top_p: None,
            seed: None,
            stop: None,
            stream: false,
            response_format: None,
        }
    }

    /// Create a builder for this request.
    pub fn builder() -> CompletionRequestBuilder {
        CompletionRequestBuilder::new()
    }

    /// Check the request against the gateway's documented bounds.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::invalid_request("model", "model is required"));
        }

        if self.messages.is_empty() {
            return Err(Error::invalid_request(
                "messages",
                "at least one message is required",
            ));
        }

        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::invalid_request(
                "temperature",
                format!("temperature must be between 0.0 and 2.0, got {}", self.temperature),
            ));
        }

        if self.max_tokens == Some(0) {
            return Err(Error::invalid_request(
                "max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        if let Some(top_p) = self.top_p {
            if !top_p.is_finite() || !(0.0..=1.0).contains(&top_p) {
                return Err(Error::invalid_request(
                    "top_p",
                    format!("top_p must be between 0.0 and 1.0, got {top_p}"),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for chat requests.
#[derive(Debug, Default)]
pub struct CompletionRequestBuilder {
    model: Option<String>,
    messages: Vec<Message>,
    system_message: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    seed: Option<i64>,
    stop: Option<Vec<String>>,
    stream: bool,
    response_format: Option<ResponseFormat>,
}

impl CompletionRequestBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether a model has been chosen.
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Add a message to the conversation.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add multiple messages to the conversation.
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set the system message; it is placed ahead of every other message.
    pub fn system_message(mut self, content: impl Into<String>) -> Self {
        self.system_message = Some(content.into());
        self
    }

    /// Add a user message.
    pub fn user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Add an assistant message.
    pub fn assistant_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of tokens to generate.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the top-p sampling parameter.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the seed for deterministic sampling.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add a stop sequence.
    pub fn add_stop(mut self, sequence: impl Into<String>) -> Self {
        self.stop.get_or_insert_with(Vec::new).push(sequence.into());
        self
    }

    /// Enable streaming.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the response format.
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Ask for a single JSON object as output.
    pub fn json_mode(self) -> Self {
        self.response_format(ResponseFormat::JsonObject)
    }

    /// Build the chat request.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest` error if required fields are missing or
    /// a parameter is out of range.
    pub fn build(self) -> Result<CompletionRequest> {
        let model = self
            .model
            .ok_or_else(|| Error::invalid_request("model", "model is required"))?;

        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = self.system_message {
            messages.push(Message::system(system));
        }
        messages.extend(self.messages);

        let request = CompletionRequest {
            model,
            messages,
            temperature: self
                .temperature
                .unwrap_or(CompletionRequest::DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            seed: self.seed,
            stop: self.stop,
            stream: self.stream,
            response_format: self.response_format,
        };
        request.validate()?;
        Ok(request)
    }
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant, )+
        }

        impl $name {
            /// Every accepted value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire representation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                let value = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value))
                    .ok_or_else(|| {
                        let accepted: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        Error::configuration(format!(
                            "unknown {} '{}', expected one of: {}",
                            stringify!($name),
                            value,
                            accepted.join(", ")
                        ))
                    })
            }
        }
    };
}

wire_enum! {
    /// Pixel dimensions of a generated image.
    pub enum ImageSize {
        /// 256x256 (dall-e-2).
        Square256 => "256x256",
        /// 512x512 (dall-e-2).
        Square512 => "512x512",
        /// 1024x1024.
        Square1024 => "1024x1024",
        /// 1792x1024 landscape (dall-e-3).
        Landscape1792 => "1792x1024",
        /// 1024x1792 portrait (dall-e-3).
        Portrait1792 => "1024x1792",
    }
}

wire_enum! {
    /// Rendering quality.
    pub enum ImageQuality {
        /// Standard quality.
        Standard => "standard",
        /// Finer detail, slower and more expensive.
        Hd => "hd",
    }
}

wire_enum! {
    /// Rendering style.
    pub enum ImageStyle {
        /// Hyper-real, dramatic images.
        Vivid => "vivid",
        /// More natural, less saturated images.
        Natural => "natural",
    }
}

wire_enum! {
    /// How generated images are delivered.
    pub enum ImageResponseFormat {
        /// A hosted URL.
        Url => "url",
        /// Inline base64-encoded image data.
        B64Json => "b64_json",
    }
}

/// Request for image generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    /// Image model, e.g. `dall-e-3`.
    pub model: String,
    /// Text description of the desired image.
    pub prompt: String,
    /// Number of images to generate.
    #[serde(rename = "n")]
    pub count: u32,
    /// Image dimensions.
    pub size: ImageSize,
    /// Rendering quality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<ImageQuality>,
    /// Rendering style.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ImageStyle>,
    /// Delivery format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ImageResponseFormat>,
}

impl ImageRequest {
    /// Upper bound on images per request accepted by any model.
    pub const MAX_COUNT: u32 = 10;

    /// Create a request for one square 1024px image.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            count: 1,
            size: ImageSize::Square1024,
            quality: None,
            style: None,
            response_format: None,
        }
    }

    /// Set the number of images.
    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the image size.
    pub fn size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    /// Set the quality.
    pub fn quality(mut self, quality: ImageQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Set the style.
    pub fn style(mut self, style: ImageStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Set the delivery format.
    pub fn response_format(mut self, format: ImageResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Check the request, including the limits of the DALL·E model families.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::invalid_request("model", "model is required"));
        }

        if self.prompt.trim().is_empty() {
            return Err(Error::invalid_request("prompt", "prompt must not be empty"));
        }

        if !(1..=Self::MAX_COUNT).contains(&self.count) {
            return Err(Error::invalid_request(
                "n",
                format!("image count must be between 1 and {}, got {}", Self::MAX_COUNT, self.count),
            ));
        }

        match self.model.as_str() {
            "dall-e-3" => {
                if self.count != 1 {
                    return Err(Error::invalid_request(
                        "n",
                        "dall-e-3 generates exactly one image per request",
                    ));
                }
                if matches!(self.size, ImageSize::Square256 | ImageSize::Square512) {
                    return Err(Error::invalid_request(
                        "size",
                        format!("dall-e-3 does not support size {}", self.size),
                    ));
                }
            }
            "dall-e-2" => {
                if matches!(self.size, ImageSize::Landscape1792 | ImageSize::Portrait1792) {
                    return Err(Error::invalid_request(
                        "size",
                        format!("dall-e-2 does not support size {}", self.size),
                    ));
                }
                if self.quality.is_some() || self.style.is_some() {
                    return Err(Error::invalid_request(
                        "quality",
                        "dall-e-2 does not accept quality or style",
                    ));
                }
            }
            _ => {}
        }

        Ok(())
    }
}
