//! Client configuration.

use std::time::Duration;

use crate::error::{NotionError, Result};

pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the Notion API.
#[derive(Clone)]
pub struct NotionConfig {
    pub api_key: String,
    pub notion_version: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl NotionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            base_url: DEFAULT_NOTION_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `NOTION_API_KEY` (required), `NOTION_VERSION`, `NOTION_API_URL` and
    /// `NOTION_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let api_key = env_value("NOTION_API_KEY")
            .ok_or_else(|| NotionError::auth("NOTION_API_KEY is not set"))?;

        let mut config = Self::new(api_key);
        if let Some(version) = env_value("NOTION_VERSION") {
            config.notion_version = version;
        }
        if let Some(url) = env_value("NOTION_API_URL") {
            config = config.with_base_url(&url);
        }
        if let Some(secs) = env_value("NOTION_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                NotionError::invalid_request(format!("NOTION_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl std::fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionConfig")
            .field("api_key", &"<redacted>")
            .field("notion_version", &self.notion_version)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_public_api() {
        let config = NotionConfig::new("secret_abc");
        assert_eq!(config.base_url, "https://api.notion.com");
        assert_eq!(config.notion_version, "2022-06-28");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = NotionConfig::new("k").with_base_url("http://127.0.0.1:9000/ ");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn debug_hides_api_key() {
        let rendered = format!("{:?}", NotionConfig::new("secret_abc"));
        assert!(!rendered.contains("secret_abc"));
    }
}
