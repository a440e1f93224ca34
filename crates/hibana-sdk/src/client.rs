//! HTTP client for the Hibana gateway.

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE,
};
use reqwest::Method;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::request::{CompletionRequest, CompletionRequestBuilder, ImageRequest, Message, ResponseFormat};
use crate::response::{BalanceInfo, CompletionResult, GeneratedImage, ImageResult, ImageSource, ModelInfo};
use crate::retry::RetryPolicy;
use crate::streaming::{ChatStream, StreamResult};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, REQUEST_ID_HEADER};
use crate::wire::{BalanceBody, ChatCompletionBody, ImagesBody, ModelBody, ModelListBody};

const EVENT_STREAM: &str = "text/event-stream";

/// Client for interacting with the Hibana gateway.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```rust,no_run
/// use hibana_sdk::Client;
///
/// #[tokio::main]
/// async fn main() -> Result<(), hibana_sdk::Error> {
///     let client = Client::builder()
///         .api_key("your-api-key")
///         .build()?;
///
///     let reply = client
///         .chat()
///         .model("gpt-5-nano")
///         .user_message("Hello!")
///         .send()
///         .await?;
///
///     println!("{}", reply.text);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client over the default `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let headers = default_headers(&config)?;
        Ok(Self {
            transport,
            retry: RetryPolicy::from_config(&config),
            config: Arc::new(config),
            headers,
        })
    }

    /// Create a client from `HIBANA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Retry policy applied to every call.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Create a chat request builder.
    pub fn chat(&self) -> ChatBuilder {
        ChatBuilder::new(self.clone())
    }

    /// Start a multi-turn conversation with `model`.
    pub fn conversation(&self, model: impl Into<String>) -> Conversation {
        Conversation::new(self.clone(), model)
    }

    /// Send a chat completion request.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn chat_completion(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        let mut request = self.resolve_model(request);
        if request.stream {
            request.to_mut().stream = false;
        }
        request.validate()?;

        let url = self.config.endpoint(&["chat", "completions"])?;
        let body = encode(&*request)?;
        debug!(%url, "Sending chat completion request");

        self.execute_json::<ChatCompletionBody>(Method::POST, url, Some(body))
            .await?
            .into_result()
    }

    /// Send a streaming chat completion request.
    ///
    /// Retries cover opening the stream; chunks already delivered are never
    /// replayed. The timeout bounds opening the stream and then each wait for
    /// the next piece of the body.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn chat_completion_stream(&self, request: &CompletionRequest) -> Result<ChatStream> {
        let mut request = self.resolve_model(request);
        request.to_mut().stream = true;
        request.validate()?;

        let url = self.config.endpoint(&["chat", "completions"])?;
        let body = encode(&*request)?;
        debug!(%url, "Sending streaming chat completion request");

        self.retry
            .execute(|_| {
                let prepared = self.prepare(Method::POST, url.clone(), Some(body.clone()), EVENT_STREAM);
                async move {
                    let prepared = prepared?;
                    let request_id = prepared.header(REQUEST_ID_HEADER).map(String::from);
                    let response = self
                        .bounded(prepared, |response| async move {
                            if response.is_success() {
                                Ok(response)
                            } else {
                                Err(error_from(response).await)
                            }
                        })
                        .await?;
                    Ok(ChatStream::with_timeout(response.body, self.config.timeout, request_id))
                }
            })
            .await
    }

    /// Generate images from a prompt.
    #[instrument(skip(self, request), fields(model = %request.model, count = request.count))]
    pub async fn generate_images(&self, request: &ImageRequest) -> Result<ImageResult> {
        request.validate()?;

        let url = self.config.endpoint(&["images", "generations"])?;
        let body = encode(request)?;
        debug!(%url, "Sending image generation request");

        let result = self
            .execute_json::<ImagesBody>(Method::POST, url, Some(body))
            .await?
            .into_result()?;

        if result.len() != request.count as usize {
            return Err(Error::decode(format!(
                "requested {} image(s) but the gateway returned {}",
                request.count,
                result.len()
            )));
        }
        Ok(result)
    }

    /// List available models, in gateway order.
    #[instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.config.endpoint(&["models"])?;
        debug!(%url, "Listing models");

        let body = self.execute_json::<ModelListBody>(Method::GET, url, None).await?;
        Ok(body.into_models())
    }

    /// Fetch one model by id.
    #[instrument(skip(self))]
    pub async fn get_model(&self, id: &str) -> Result<ModelInfo> {
        if id.trim().is_empty() {
            return Err(Error::invalid_request("model", "model id must not be empty"));
        }

        let url = self.config.endpoint(&["models", id])?;
        debug!(%url, "Fetching model");

        let body = self.execute_json::<ModelBody>(Method::GET, url, None).await?;
        Ok(body.into())
    }

    /// Query the account balance.
    #[instrument(skip(self))]
    pub async fn balance(&self) -> Result<BalanceInfo> {
        let url = self.config.endpoint(&["user", "balance"])?;
        debug!(%url, "Fetching balance");

        let body = self.execute_json::<BalanceBody>(Method::GET, url, None).await?;
        Ok(body.into())
    }

    /// Obtain the bytes of a generated image.
    ///
    /// Inline images are decoded locally. Hosted images are fetched without
    /// the gateway credentials, since they usually live on a separate CDN.
    #[instrument(skip(self, image))]
    pub async fn download_image(&self, image: &GeneratedImage) -> Result<Bytes> {
        let url = match &image.source {
            ImageSource::Base64(_) => {
                return Ok(image.decode_inline()?.map(Bytes::from).unwrap_or_default());
            }
            ImageSource::Url(url) => Url::parse(url).map_err(|e| {
                Error::decode(format!("image URL '{url}' is invalid: {e}")).with_source(e)
            })?,
        };
        debug!(%url, "Downloading image");

        let request = HttpRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        };
        self.bounded(request, read_success).await
    }

    fn resolve_model<'a>(&self, request: &'a CompletionRequest) -> Cow<'a, CompletionRequest> {
        match self.config.default_model() {
            Some(model) if request.model.trim().is_empty() => {
                let mut request = request.clone();
                request.model = model.to_string();
                Cow::Owned(request)
            }
            _ => Cow::Borrowed(request),
        }
    }

    /// Build one attempt's request with a fresh request id.
    fn prepare(&self, method: Method, url: Url, body: Option<Bytes>, accept: &'static str) -> Result<HttpRequest> {
        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        let request_id = HeaderValue::from_str(&Uuid::new_v4().to_string())
            .map_err(|e| Error::configuration(format!("Invalid request id: {e}")))?;
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), request_id);

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Send a request and run `read` on the response, bounded by the timeout.
    async fn bounded<F, Fut, T>(&self, request: HttpRequest, read: F) -> Result<T>
    where
        F: FnOnce(HttpResponse) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let request_id = request.header(REQUEST_ID_HEADER).map(String::from);
        let timeout = self.config.timeout;

        let exchange = async {
            let response = self.transport.send(request).await?;
            read(response).await
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(timeout)),
        };

        match request_id {
            Some(id) => result.map_err(|e| e.with_request_id(id)),
            None => result,
        }
    }

    async fn execute_json<T: DeserializeOwned>(&self, method: Method, url: Url, body: Option<Bytes>) -> Result<T> {
        let bytes = self
            .retry
            .execute(|_| {
                let prepared = self.prepare(method.clone(), url.clone(), body.clone(), "application/json");
                async move { self.bounded(prepared?, read_success).await }
            })
            .await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::decode(format!("Failed to parse response: {e}")).with_source(e)
        })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url.as_str())
            .field("timeout", &self.config.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key_value()))
        .map_err(|_| Error::configuration("API key contains characters not allowed in a header"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    for (name, value) in &config.custom_headers {
        let header_name = HeaderName::try_from(name.as_str())
            .map_err(|e| Error::configuration(format!("Invalid header name '{name}': {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| Error::configuration(format!("Invalid header value for '{name}': {e}")))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::invalid_request("body", format!("request cannot be encoded: {e}")).with_source(e))
}

async fn read_success(response: HttpResponse) -> Result<Bytes> {
    if response.is_success() {
        response.bytes().await
    } else {
        Err(error_from(response).await)
    }
}

/// Classify a non-success response, reading its body for details.
async fn error_from(response: HttpResponse) -> Error {
    let status = response.status;
    let request_id = response.request_id();
    let retry_after = response.retry_after();

    match response.bytes().await {
        Ok(body) => Error::from_response(status, &body, request_id, retry_after),
        Err(e) => Error::from_response(status, b"", request_id, retry_after).with_source(e),
    }
}

/// Builder for creating a Client.
pub struct ClientBuilder {
    base_url: Option<String>,
    api_key: Option<Secret<String>>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_base_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
    user_agent: Option<String>,
    default_model: Option<String>,
    custom_headers: Vec<(String, String)>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: None,
            connect_timeout: None,
            max_retries: None,
            retry_base_delay: None,
            retry_max_delay: None,
            user_agent: None,
            default_model: None,
            custom_headers: Vec::new(),
            transport: None,
        }
    }

    /// Set the base URL, with or without the `/v1` suffix.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Secret::new(key.into()));
        self
    }

    /// Set the per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the delay before the first retry.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    /// Set the maximum retry delay.
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = Some(delay);
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the default model.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Use a custom transport instead of `reqwest`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let api_key = self
            .api_key
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| Error::configuration("API key is required"))?;

        let base_url = self
            .base_url
            .as_deref()
            .unwrap_or(ClientConfig::DEFAULT_BASE_URL);
        let base_url = Url::parse(base_url).map_err(|e| {
            Error::configuration(format!("Invalid base URL '{base_url}': {e}")).with_source(e)
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "Base URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }

        let mut config = ClientConfig::new(base_url, api_key.expose_secret().clone());
        config.timeout = self.timeout.unwrap_or(ClientConfig::DEFAULT_TIMEOUT);
        config.connect_timeout = self.connect_timeout.unwrap_or(ClientConfig::DEFAULT_CONNECT_TIMEOUT);
        config.max_retries = self.max_retries.unwrap_or(ClientConfig::DEFAULT_MAX_RETRIES);
        config.retry_base_delay = self.retry_base_delay.unwrap_or(ClientConfig::DEFAULT_RETRY_BASE_DELAY);
        config.retry_max_delay = self.retry_max_delay.unwrap_or(ClientConfig::DEFAULT_RETRY_MAX_DELAY);
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        config.default_model = self.default_model;
        config.custom_headers = self.custom_headers;

        match self.transport {
            Some(transport) => Client::with_transport(config, transport),
            None => Client::new(config),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for chat completion requests.
#[derive(Debug)]
pub struct ChatBuilder {
    client: Client,
    builder: CompletionRequestBuilder,
}

impl ChatBuilder {
    fn new(client: Client) -> Self {
        let mut builder = CompletionRequestBuilder::new();

        if let Some(model) = client.config.default_model() {
            builder = builder.model(model);
        }

        Self { client, builder }
    }

    /// Set the model to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.builder = self.builder.model(model);
        self
    }

    /// Add a message.
    pub fn message(mut self, message: Message) -> Self {
        self.builder = self.builder.message(message);
        self
    }

    /// Add several messages, oldest first.
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.builder = self.builder.messages(messages);
        self
    }

    /// Set the system message.
    pub fn system_message(mut self, content: impl Into<String>) -> Self {
        self.builder = self.builder.system_message(content);
        self
    }

    /// Add a user message.
    pub fn user_message(mut self, content: impl Into<String>) -> Self {
        self.builder = self.builder.user_message(content);
        self
    }

    /// Add an assistant message.
    pub fn assistant_message(mut self, content: impl Into<String>) -> Self {
        self.builder = self.builder.assistant_message(content);
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.builder = self.builder.temperature(temperature);
        self
    }

    /// Set max tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.builder = self.builder.max_tokens(max_tokens);
        self
    }

    /// Set top_p.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.builder = self.builder.top_p(top_p);
        self
    }

    /// Set the seed.
    pub fn seed(mut self, seed: i64) -> Self {
        self.builder = self.builder.seed(seed);
        self
    }

    /// Add a stop sequence.
    pub fn stop(mut self, sequence: impl Into<String>) -> Self {
        self.builder = self.builder.add_stop(sequence);
        self
    }

    /// Ask for a single JSON object as output.
    pub fn json_mode(mut self) -> Self {
        self.builder = self.builder.response_format(ResponseFormat::JsonObject);
        self
    }

    /// Build the request without sending it.
    pub fn build(self) -> Result<CompletionRequest> {
        self.builder.build()
    }

    /// Send the request.
    pub async fn send(self) -> Result<CompletionResult> {
        let request = self.builder.build()?;
        self.client.chat_completion(&request).await
    }

    /// Send as a streaming request.
    pub async fn stream(mut self) -> Result<ChatStream> {
        self.builder = self.builder.streaming(true);
        let request = self.builder.build()?;
        self.client.chat_completion_stream(&request).await
    }

    /// Stream the reply and fold it into a single result.
    pub async fn stream_collect(self) -> Result<StreamResult> {
        self.stream().await?.collect_result().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_client_builder() {
        let client = Client::builder()
            .base_url("http://localhost:8080")
            .api_key("test-key")
            .timeout(Duration::from_secs(60))
            .max_retries(5)
            .build()
            .unwrap();

        assert_eq!(client.config.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(client.config.timeout, Duration::from_secs(60));
        assert_eq!(client.retry_policy().max_retries, 5);
    }

    #[test]
    fn test_client_default_url() {
        let client = Client::builder().api_key("test-key").build().unwrap();
        assert_eq!(client.config.base_url.as_str(), ClientConfig::DEFAULT_BASE_URL);
        assert_eq!(client.retry_policy().max_retries, 0);
    }

    #[test]
    fn test_builder_requires_api_key() {
        let err = Client::builder().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Client::builder().api_key("   ").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let err = Client::builder().api_key("k").base_url("not a url").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Client::builder().api_key("k").base_url("ftp://gateway").build().unwrap_err();
        assert!(err.message().contains("http"));
    }

    #[test]
    fn test_builder_rejects_bad_header() {
        let err = Client::builder()
            .api_key("k")
            .header("bad header", "value")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = Client::builder().api_key("sk-secret-value").build().unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret-value"));
    }

    #[test]
    fn test_prepare_sets_headers() {
        let client = Client::builder()
            .api_key("test-key")
            .header("x-team", "research")
            .build()
            .unwrap();
        let url = client.config.endpoint(&["models"]).unwrap();

        let first = client.prepare(Method::GET, url.clone(), None, "application/json").unwrap();
        let second = client.prepare(Method::GET, url, None, EVENT_STREAM).unwrap();

        assert_eq!(first.header("authorization"), Some("Bearer test-key"));
        assert_eq!(first.header("content-type"), Some("application/json"));
        assert_eq!(first.header("x-team"), Some("research"));
        assert_eq!(second.header("accept"), Some(EVENT_STREAM));
        assert_ne!(first.header(REQUEST_ID_HEADER), second.header(REQUEST_ID_HEADER));
        assert!(Uuid::parse_str(first.header(REQUEST_ID_HEADER).unwrap()).is_ok());
    }

    #[test]
    fn test_chat_builder_uses_default_model() {
        let client = Client::builder()
            .api_key("k")
            .default_model("gpt-5-nano")
            .build()
            .unwrap();

        let request = client.chat().user_message("hi").build().unwrap();
        assert_eq!(request.model, "gpt-5-nano");

        let request = client.chat().model("deepseek-chat").json_mode().user_message("hi").build().unwrap();
        assert_eq!(request.model, "deepseek-chat");
        assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
    }

    #[test]
    fn test_resolve_model_fills_blank_model() {
        let client = Client::builder().api_key("k").default_model("gpt-5-nano").build().unwrap();
        let request = CompletionRequest::new("", vec![Message::user("hi")]);
        assert_eq!(client.resolve_model(&request).model, "gpt-5-nano");

        let named = CompletionRequest::new("claude-haiku-4-5", vec![Message::user("hi")]);
        assert!(matches!(client.resolve_model(&named), Cow::Borrowed(_)));
    }
}
