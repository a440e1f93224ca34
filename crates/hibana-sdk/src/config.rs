//! Client configuration for the Hibana SDK.

use secrecy::{ExposeSecret, Secret};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// API version segment every endpoint lives under.
const API_VERSION: &str = "v1";

/// Configuration for the Hibana SDK client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the gateway, with or without the `/v1` suffix.
    pub(crate) base_url: Url,
    /// API key sent as a bearer token.
    pub(crate) api_key: Secret<String>,
    /// Per-attempt request timeout.
    pub(crate) timeout: Duration,
    /// Connection timeout duration.
    pub(crate) connect_timeout: Duration,
    /// Maximum number of retry attempts after the first.
    pub(crate) max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub(crate) retry_base_delay: Duration,
    /// Upper bound for any single retry delay.
    pub(crate) retry_max_delay: Duration,
    /// User agent string.
    pub(crate) user_agent: String,
    /// Model used when a request does not name one.
    pub(crate) default_model: Option<String>,
    /// Custom headers to include in requests.
    pub(crate) custom_headers: Vec<(String, String)>,
}

impl ClientConfig {
    /// Public Hibana gateway endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api-ai.hibanacloud.com/v1";
    /// Default request timeout (30 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default connection timeout (10 seconds).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Retries are disabled unless asked for.
    pub const DEFAULT_MAX_RETRIES: u32 = 0;
    /// Default base retry delay (1 second).
    pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    /// Default maximum retry delay (30 seconds).
    pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    /// Default user agent.
    pub const DEFAULT_USER_AGENT: &'static str =
        concat!("hibana-sdk-rust/", env!("CARGO_PKG_VERSION"));

    /// Environment variable holding the API key.
    pub const ENV_API_KEY: &'static str = "HIBANA_API_KEY";
    /// Environment variable overriding the base URL.
    pub const ENV_BASE_URL: &'static str = "HIBANA_BASE_URL";
    /// Environment variable overriding the timeout, in seconds.
    pub const ENV_TIMEOUT_SECS: &'static str = "HIBANA_TIMEOUT_SECS";
    /// Environment variable overriding the retry count.
    pub const ENV_MAX_RETRIES: &'static str = "HIBANA_MAX_RETRIES";

    /// Create a new configuration with default values.
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: Secret::new(api_key.into()),
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_base_delay: Self::DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: Self::DEFAULT_RETRY_MAX_DELAY,
            user_agent: Self::DEFAULT_USER_AGENT.to_string(),
            default_model: None,
            custom_headers: Vec::new(),
        }
    }

    /// Build a configuration from `HIBANA_*` environment variables.
    ///
    /// `HIBANA_API_KEY` is required; the others fall back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(Self::ENV_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration(format!("{} is not set", Self::ENV_API_KEY))
            })?;

        let base_url = lookup(Self::ENV_BASE_URL)
            .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(Url::parse(&base_url)?, api_key);

        if let Some(secs) = lookup(Self::ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                Error::configuration(format!("{} must be an integer: {e}", Self::ENV_TIMEOUT_SECS))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(retries) = lookup(Self::ENV_MAX_RETRIES) {
            config.max_retries = retries.trim().parse().map_err(|e| {
                Error::configuration(format!("{} must be an integer: {e}", Self::ENV_MAX_RETRIES))
            })?;
        }

        Ok(config)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the API key (exposed for use in requests).
    pub(crate) fn api_key_value(&self) -> &str {
        self.api_key.expose_secret().as_str()
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the base retry delay.
    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    /// Get the maximum retry delay.
    pub fn retry_max_delay(&self) -> Duration {
        self.retry_max_delay
    }

    /// Get the user agent.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Get the default model.
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Get custom headers.
    pub fn custom_headers(&self) -> &[(String, String)] {
        &self.custom_headers
    }

    /// Resolve an endpoint under `<base>/v1/`.
    ///
    /// Each segment is percent-encoded on its own, so model ids containing
    /// `/` or spaces stay a single path segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();

        let versioned = url
            .path_segments()
            .and_then(|mut path| path.rfind(|segment| !segment.is_empty()))
            .is_some_and(|last| last == API_VERSION);

        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::configuration(format!("base URL '{}' cannot carry a path", self.base_url)))?;
            path.pop_if_empty();
            if !versioned {
                path.push(API_VERSION);
            }
            path.extend(segments);
        }

        url.set_query(None);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_for(base: &str) -> ClientConfig {
        ClientConfig::new(Url::parse(base).unwrap(), "test-key")
    }

    #[test]
    fn test_default_config() {
        let config = config_for(ClientConfig::DEFAULT_BASE_URL);
        assert_eq!(config.timeout(), ClientConfig::DEFAULT_TIMEOUT);
        assert_eq!(config.max_retries(), 0);
        assert_eq!(config.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.api_key_value(), "test-key");
    }

    #[test]
    fn test_endpoint_with_version_suffix() {
        let config = config_for("https://api-ai.hibanacloud.com/v1");
        let url = config.endpoint(&["chat", "completions"]).unwrap();
        assert_eq!(url.as_str(), "https://api-ai.hibanacloud.com/v1/chat/completions");

        let config = ClientConfig::new(
            Url::parse("https://api-ai.hibanacloud.com/v1/").unwrap(),
            "k",
        );
        let url = config.endpoint(&["models"]).unwrap();
        assert_eq!(url.as_str(), "https://api-ai.hibanacloud.com/v1/models");
    }

    #[test]
    fn test_endpoint_without_version_suffix() {
        let config = config_for("http://localhost:8080");
        let url = config.endpoint(&["user", "balance"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/user/balance");

        let config = config_for("http://localhost:8080/proxy/");
        let url = config.endpoint(&["models"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/v1/models");
    }

    #[test]
    fn test_endpoint_encodes_model_id() {
        let config = config_for("http://localhost:8080");
        let url = config.endpoint(&["models", "org/model name"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/models/org%2Fmodel%20name");
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HIBANA_API_KEY", "env-key"),
            ("HIBANA_BASE_URL", "http://gateway.internal:9000"),
            ("HIBANA_TIMEOUT_SECS", "45"),
            ("HIBANA_MAX_RETRIES", "3"),
        ]);
        let config = ClientConfig::from_lookup(|name| vars.get(name).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.api_key_value(), "env-key");
        assert_eq!(config.base_url().as_str(), "http://gateway.internal:9000/");
        assert_eq!(config.timeout(), Duration::from_secs(45));
        assert_eq!(config.max_retries(), 3);
    }

    #[test]
    fn test_from_lookup_requires_api_key() {
        let err = ClientConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let err = ClientConfig::from_lookup(|name| match name {
            "HIBANA_API_KEY" => Some("k".to_string()),
            "HIBANA_MAX_RETRIES" => Some("many".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(err.message().contains("HIBANA_MAX_RETRIES"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config_for("http://localhost:8080");
        let debug = format!("{config:?}");
        assert!(!debug.contains("test-key"));
    }
}
