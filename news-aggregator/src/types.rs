use std::time::Duration;
// Shared records live in the interfaces crate
pub use interfaces::defs::{Article, Provider, NEW_PROVIDER_TOPIC};

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content: Option<String>, // RSS/Atom body, None on 304
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "News-Aggregator/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// Startup behaviour of the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Delay each initial job by a random amount to avoid a burst of fetches.
    pub delay_starts: bool,
    /// Upper bound (exclusive) of the random start delay.
    pub max_start_delay: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            delay_starts: false,
            max_start_delay: Duration::from_secs(60),
        }
    }
}

/// Limits applied when an operator registers a provider.
#[derive(Debug, Clone, Copy)]
pub struct PollLimits {
    pub min_seconds: u64,
    pub max_seconds: u64,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            min_seconds: 10,
            max_seconds: 60 * 60 * 24,
        }
    }
}

impl PollLimits {
    pub fn clamp(&self, seconds: u64) -> u64 {
        seconds.clamp(self.min_seconds, self.max_seconds.max(self.min_seconds))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Provider not found: {id}")]
    ProviderNotFound { id: String },

    #[error("Provider type `{provider_type}` is not supported")]
    UnsupportedProviderType { provider_type: String },

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Subscribe to `{topic}` failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Unsubscribe from `{topic}` failed: {reason}")]
    Unsubscribe { topic: String, reason: String },

    #[error("Publish to `{topic}` failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Aggregator cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl AggregatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AggregatorError::ProviderNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
