//! # Hibana SDK
//!
//! A Rust client for the Hibana AI gateway, an OpenAI-compatible endpoint
//! that fronts OpenAI, Anthropic, DeepSeek and Google models behind one key.
//!
//! ## Features
//!
//! - Chat completions, with JSON mode and multi-turn conversations
//! - Streaming responses with Server-Sent Events
//! - Image generation
//! - Model listing and account balance
//! - Optional retries with exponential backoff
//! - One error type classified by [`ErrorKind`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hibana_sdk::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hibana_sdk::Error> {
//!     let client = Client::builder()
//!         .api_key("your-api-key")
//!         .build()?;
//!
//!     let reply = client
//!         .chat()
//!         .model("gpt-5-nano")
//!         .user_message("Hello, world!")
//!         .send()
//!         .await?;
//!
//!     println!("Response: {}", reply.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use hibana_sdk::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hibana_sdk::Error> {
//!     let client = Client::from_env()?;
//!
//!     let mut stream = client
//!         .chat()
//!         .model("claude-haiku-4-5")
//!         .user_message("Tell me a story")
//!         .stream()
//!         .await?;
//!
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?.text());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod client;
mod compare;
mod config;
mod conversation;
mod error;
mod request;
mod response;
mod retry;
mod streaming;
pub mod transport;
mod wire;

pub use client::{ChatBuilder, Client, ClientBuilder};
pub use compare::{fastest, ModelComparison};
pub use config::ClientConfig;
pub use conversation::Conversation;
pub use error::{Error, ErrorKind, Result};
pub use request::{
    CompletionRequest, CompletionRequestBuilder, ImageQuality, ImageRequest, ImageResponseFormat,
    ImageSize, ImageStyle, Message, ResponseFormat, Role,
};
pub use response::{
    group_thousands, BalanceInfo, BalanceStatus, CompletionResult, FinishReason, GeneratedImage,
    ImageResult, ImageSource, ModelCategory, ModelInfo, Usage,
};
pub use retry::RetryPolicy;
pub use streaming::{ChatStream, StreamChunk, StreamResult};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
