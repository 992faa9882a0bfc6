//! Runtime configuration, loaded from an optional TOML file with
//! environment overrides for the publishing credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::pacing::DelayWindow;

pub const ENV_PAGE_ID: &str = "PROMO_PAGE_ID";
pub const ENV_ACCESS_TOKEN: &str = "PROMO_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retry budget, redirect cap, timeouts and pacing for product extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pre_fetch_delay")]
    pub pre_fetch_delay: DelayWindow,
    #[serde(default = "default_redirect_delay")]
    pub redirect_delay: DelayWindow,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: DelayWindow,
    /// Origin used for site-relative image paths when no page URL applies
    #[serde(default = "default_fallback_origin")]
    pub fallback_origin: String,
}

impl ExtractionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_redirects: default_max_redirects(),
            request_timeout_secs: default_request_timeout_secs(),
            pre_fetch_delay: default_pre_fetch_delay(),
            redirect_delay: default_redirect_delay(),
            retry_backoff: default_retry_backoff(),
            fallback_origin: default_fallback_origin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Spreadsheet rows exported as CSV
    #[serde(default = "default_rows_path")]
    pub rows_path: PathBuf,
    #[serde(default = "default_cursor_path")]
    pub cursor_path: PathBuf,
    #[serde(default = "default_true")]
    pub has_headers: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            rows_path: default_rows_path(),
            cursor_path: default_cursor_path(),
            has_headers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_pre_post_delay")]
    pub pre_post_delay: DelayWindow,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            page_id: String::new(),
            access_token: String::new(),
            api_base: default_api_base(),
            pre_post_delay: default_pre_post_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default env_logger filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_redirects() -> usize {
    5
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_pre_fetch_delay() -> DelayWindow {
    DelayWindow::new(1000, 3000)
}

fn default_redirect_delay() -> DelayWindow {
    DelayWindow::new(500, 1500)
}

fn default_retry_backoff() -> DelayWindow {
    DelayWindow::new(3000, 9000)
}

fn default_fallback_origin() -> String {
    "https://www.amazon.com".to_string()
}

fn default_rows_path() -> PathBuf {
    PathBuf::from("job.csv")
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from(".current_row_index")
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_pre_post_delay() -> DelayWindow {
    DelayWindow::new(1000, 2000)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Loads `path` when given, else defaults, then applies env overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(page_id) = std::env::var(ENV_PAGE_ID)
            && !page_id.is_empty()
        {
            self.publisher.page_id = page_id;
        }
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN)
            && !token.is_empty()
        {
            self.publisher.access_token = token;
        }
    }

    /// Checks every field at once and reports all problems together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let ex = &self.extraction;

        if ex.max_retries == 0 {
            errors.push("extraction.max_retries must be positive".to_string());
        }
        if ex.max_redirects == 0 {
            errors.push("extraction.max_redirects must be positive".to_string());
        }
        if ex.request_timeout_secs == 0 {
            errors.push("extraction.request_timeout_secs must be positive".to_string());
        }
        for (name, window) in [
            ("extraction.pre_fetch_delay", &ex.pre_fetch_delay),
            ("extraction.redirect_delay", &ex.redirect_delay),
            ("extraction.retry_backoff", &ex.retry_backoff),
            ("publisher.pre_post_delay", &self.publisher.pre_post_delay),
        ] {
            if window.min_ms > window.max_ms {
                errors.push(format!(
                    "{name}: min_ms ({}) exceeds max_ms ({})",
                    window.min_ms, window.max_ms
                ));
            }
        }
        if url::Url::parse(&ex.fallback_origin).is_err() {
            errors.push(format!(
                "extraction.fallback_origin is not a valid URL: {:?}",
                ex.fallback_origin
            ));
        }
        if url::Url::parse(&self.publisher.api_base).is_err() {
            errors.push(format!(
                "publisher.api_base is not a valid URL: {:?}",
                self.publisher.api_base
            ));
        }

        if !errors.is_empty() {
            bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
        }
        Ok(())
    }

    /// Publishing needs credentials; extraction alone does not.
    pub fn require_publisher_credentials(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.publisher.page_id.trim().is_empty() {
            missing.push(format!("publisher.page_id (or {ENV_PAGE_ID})"));
        }
        if self.publisher.access_token.trim().is_empty() {
            missing.push(format!("publisher.access_token (or {ENV_ACCESS_TOKEN})"));
        }
        if !missing.is_empty() {
            bail!("Missing publisher credentials: {}", missing.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.extraction.max_retries, 3);
        assert_eq!(config.extraction.max_redirects, 5);
        let ex = &config.extraction;
        assert!(ex.retry_backoff.width_ms() > ex.pre_fetch_delay.width_ms());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [extraction]
            max_retries = 5

            [publisher]
            page_id = "123"
            "#,
        )
        .unwrap();
        assert_eq!(config.extraction.max_retries, 5);
        assert_eq!(config.extraction.request_timeout_secs, 15);
        assert_eq!(config.publisher.page_id, "123");
        assert_eq!(config.content.cursor_path, PathBuf::from(".current_row_index"));
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = Config::default();
        config.extraction.max_retries = 0;
        config.extraction.redirect_delay = DelayWindow::new(900, 100);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_retries"));
        assert!(err.contains("redirect_delay"));
    }

    #[test]
    fn credentials_required_for_publishing() {
        let config = Config::default();
        let err = config.require_publisher_credentials().unwrap_err().to_string();
        assert!(err.contains("page_id"));
        assert!(err.contains("access_token"));
    }
}
