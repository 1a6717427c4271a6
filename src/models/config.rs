//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP client settings shared by sources and the notifier
    #[serde(default)]
    pub http: HttpConfig,

    /// Destination set and dispatch behavior
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Sender identity shown by the chat service
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Comment relay settings
    #[serde(default)]
    pub comments: CommentsConfig,

    /// Feed relay settings
    #[serde(default)]
    pub feed: FeedConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("cannot read {}: {e}", path.display())))?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.delivery.truncate_length < MIN_TRUNCATE_LENGTH {
            return Err(AppError::validation(format!(
                "delivery.truncate_length must be >= {MIN_TRUNCATE_LENGTH}"
            )));
        }
        for webhook in &self.delivery.webhooks {
            // Used verbatim as ledger keys
            if webhook.is_empty() || webhook.trim() != webhook {
                return Err(AppError::validation(format!(
                    "webhook URL {:?} is empty or has surrounding whitespace",
                    crate::utils::redact_webhook(webhook)
                )));
            }
            let parsed = url::Url::parse(webhook)
                .map_err(|e| AppError::validation(format!("invalid webhook URL: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::validation(format!(
                    "webhook URL must be http(s), got scheme {}",
                    parsed.scheme()
                )));
            }
        }
        for feed in &self.feed.urls {
            url::Url::parse(feed)
                .map_err(|e| AppError::validation(format!("invalid feed URL {feed}: {e}")))?;
        }
        if self.comments.store_path == self.feed.store_path {
            return Err(AppError::validation(
                "comments.store_path and feed.store_path must differ",
            ));
        }
        Ok(())
    }
}

/// Smallest body length that still leaves room for a read-more footer.
pub const MIN_TRUNCATE_LENGTH: usize = 256;

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter (`RUST_LOG` takes precedence)
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Append log lines to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            file: None,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Destination set and dispatch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Webhook URLs; each URL is a distinct destination
    #[serde(default)]
    pub webhooks: Vec<String>,

    /// Minimum delay between dispatches to the same destination host
    #[serde(default = "defaults::rate_limit")]
    pub rate_limit_ms: u64,

    /// Maximum message body length
    #[serde(default = "defaults::truncate_length")]
    pub truncate_length: usize,

    /// Persist markers after every successful dispatch, not just at run end
    #[serde(default)]
    pub persist_each_dispatch: bool,
}

impl DeliveryConfig {
    /// Configured webhooks in order, without duplicates.
    ///
    /// Entries are returned exactly as written; [`Config::validate`]
    /// rejects blank or padded ones.
    pub fn destinations(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.webhooks
            .iter()
            .filter(|w| seen.insert(w.as_str()))
            .cloned()
            .collect()
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhooks: Vec::new(),
            rate_limit_ms: defaults::rate_limit(),
            truncate_length: defaults::truncate_length(),
            persist_each_dispatch: false,
        }
    }
}

/// Sender identity for webhook posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "defaults::username")]
    pub username: String,

    #[serde(default = "defaults::avatar_url")]
    pub avatar_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            username: defaults::username(),
            avatar_url: defaults::avatar_url(),
        }
    }
}

/// Comment relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsConfig {
    /// Marker file for comment ordinals
    #[serde(default = "defaults::comments_store")]
    pub store_path: PathBuf,

    /// Applications whose announcement comments are relayed
    #[serde(default)]
    pub app_ids: Vec<u64>,

    /// Author allow-set; empty relays every author
    #[serde(default)]
    pub user_ids: Vec<u64>,

    /// Number of newest announcements to scan
    #[serde(default = "defaults::article_count")]
    pub article_count: usize,

    /// Comments older than this are never announced
    #[serde(default = "defaults::comment_max_age")]
    pub max_age_hours: u64,
}

impl CommentsConfig {
    pub fn max_age(&self) -> chrono::Duration {
        hours(self.max_age_hours)
    }
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            store_path: defaults::comments_store(),
            app_ids: Vec::new(),
            user_ids: Vec::new(),
            article_count: defaults::article_count(),
            max_age_hours: defaults::comment_max_age(),
        }
    }
}

/// Feed relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Marker file for entry hashes
    #[serde(default = "defaults::feed_store")]
    pub store_path: PathBuf,

    /// RSS/Atom feed URLs
    #[serde(default)]
    pub urls: Vec<String>,

    /// Maximum number of entries read per feed
    #[serde(default = "defaults::feed_limit")]
    pub limit: Option<usize>,

    /// Entries older than this are not announced as new
    #[serde(default = "defaults::feed_max_age")]
    pub max_age_hours: u64,

    /// Always announce this many of the most recent entries, regardless of age
    #[serde(default)]
    pub force_recent: usize,
}

impl FeedConfig {
    pub fn max_age(&self) -> chrono::Duration {
        hours(self.max_age_hours)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            store_path: defaults::feed_store(),
            urls: Vec::new(),
            limit: defaults::feed_limit(),
            max_age_hours: defaults::feed_max_age(),
            force_recent: 0,
        }
    }
}

fn hours(h: u64) -> chrono::Duration {
    // chrono durations are bounded by i64 milliseconds
    const MAX_HOURS: u64 = (i64::MAX / 3_600_000) as u64;
    chrono::Duration::hours(h.min(MAX_HOURS) as i64)
}

mod defaults {
    use std::path::PathBuf;

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn user_agent() -> String {
        concat!("Mozilla/5.0 (compatible; tracker/", env!("CARGO_PKG_VERSION"), ")").into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Four posts per second
    pub fn rate_limit() -> u64 {
        250
    }
    pub fn truncate_length() -> usize {
        2048
    }

    pub fn username() -> String {
        "Steam Community".into()
    }
    pub fn avatar_url() -> Option<String> {
        Some(
            "https://upload.wikimedia.org/wikipedia/commons/thumb/8/83/Steam_icon_logo.svg/512px-Steam_icon_logo.svg.png"
                .into(),
        )
    }

    pub fn comments_store() -> PathBuf {
        PathBuf::from("comments.json")
    }
    pub fn article_count() -> usize {
        1
    }
    pub fn comment_max_age() -> u64 {
        24 * 7
    }

    pub fn feed_store() -> PathBuf {
        PathBuf::from("feed.json")
    }
    pub fn feed_limit() -> Option<usize> {
        Some(10)
    }
    pub fn feed_max_age() -> u64 {
        24
    }
}
