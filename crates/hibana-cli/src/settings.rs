//! Connection settings: flags and environment over an optional TOML profile.

use anyhow::{bail, Context, Result};
use hibana_sdk::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::GlobalOptions;

/// Model used by `chat` when neither a flag nor the profile names one.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-5-nano";

const PROFILE_FILE: &str = "config.toml";

/// Contents of a profile file, e.g.:
///
/// ```toml
/// api_key = "hb-..."
/// base_url = "https://api-ai.hibanacloud.com/v1"
/// timeout = "45s"
/// max_retries = 2
/// default_model = "claude-haiku-4-5"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub default_model: Option<String>,
}

impl Settings {
    /// Read the profile at `path`, or the default profile if it exists.
    ///
    /// An explicitly named file must exist; a missing default profile yields
    /// empty settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("invalid profile {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded profile");
        Ok(settings)
    }

    /// Apply command-line and environment values on top of the profile.
    pub fn merge(self, overrides: &GlobalOptions) -> Self {
        Self {
            api_key: overrides.api_key.clone().or(self.api_key),
            base_url: overrides.url.clone().or(self.base_url),
            timeout: overrides.timeout.or(self.timeout),
            max_retries: overrides.max_retries.or(self.max_retries),
            default_model: self.default_model,
        }
    }

    /// Build an SDK client from the resolved settings.
    pub fn build_client(&self) -> Result<Client> {
        let Some(api_key) = self.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
            bail!("no API key configured: pass --api-key, set HIBANA_API_KEY or add api_key to the profile");
        };

        let mut builder = Client::builder()
            .api_key(api_key)
            .default_model(self.default_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL));

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(retries) = self.max_retries {
            builder = builder.max_retries(retries);
        }

        Ok(builder.build()?)
    }
}

/// `config.toml` in the platform configuration directory.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "hibanacloud", "hibana")
        .map(|dirs| dirs.config_dir().join(PROFILE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn profile(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_profile() {
        let file = profile(
            r#"
            api_key = "hb-profile"
            base_url = "http://localhost:9000/v1"
            timeout = "1m 30s"
            max_retries = 3
            default_model = "deepseek-chat"
            "#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("hb-profile"));
        assert_eq!(settings.timeout, Some(Duration::from_secs(90)));
        assert_eq!(settings.max_retries, Some(3));
        assert_eq!(settings.default_model.as_deref(), Some("deepseek-chat"));
    }

    #[test]
    fn test_flags_override_profile() {
        let file = profile("api_key = \"from-file\"\nmax_retries = 1\n");
        let overrides = GlobalOptions {
            api_key: Some("from-flag".to_string()),
            timeout: Some(Duration::from_secs(5)),
            ..GlobalOptions::default()
        };

        let settings = Settings::load(Some(file.path())).unwrap().merge(&overrides);
        assert_eq!(settings.api_key.as_deref(), Some("from-flag"));
        assert_eq!(settings.max_retries, Some(1));
        assert_eq!(settings.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let file = profile("api_key = \"k\"\nretries = 2\n");
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("invalid profile"));
    }

    #[test]
    fn test_missing_explicit_profile() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read profile"));
    }

    #[test]
    fn test_client_requires_key() {
        let err = Settings::default().build_client().unwrap_err();
        assert!(err.to_string().contains("no API key"));

        let blank = Settings {
            api_key: Some("  ".to_string()),
            ..Settings::default()
        };
        assert!(blank.build_client().is_err());
    }

    #[test]
    fn test_client_uses_profile_values() {
        let settings = Settings {
            api_key: Some("k".to_string()),
            base_url: Some("http://localhost:9000".to_string()),
            timeout: Some(Duration::from_secs(7)),
            max_retries: Some(2),
            default_model: None,
        };

        let client = settings.build_client().unwrap();
        assert_eq!(client.config().timeout(), Duration::from_secs(7));
        assert_eq!(client.config().max_retries(), 2);
        assert_eq!(client.config().default_model(), Some(DEFAULT_CHAT_MODEL));
    }
}
