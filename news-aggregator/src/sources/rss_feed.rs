use crate::traits::PullFeed;
use crate::types::{AggregatorError, Article, Provider, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Generic RSS/Atom provider
pub struct RssFeedSource {
    pub label: String,
    pub url: String,
    fetcher: Fetcher,
    parser: FeedParser,
    poll_interval: Duration,
    last_etag: Option<String>,
    last_modified: Option<String>,
    // validators of the last pull, applied on commit
    pending: Option<(Option<String>, Option<String>)>,
}

impl RssFeedSource {
    pub fn new(label: &str, url: &str, poll_interval: Duration, fetcher: Fetcher) -> Result<Self> {
        if label.trim().is_empty() {
            return Err(AggregatorError::InvalidProvider("label is required".to_string()));
        }

        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
            return Err(AggregatorError::InvalidProvider(format!("feed URL `{}` is not an http(s) URL", url)));
        }

        if poll_interval.is_zero() {
            return Err(AggregatorError::InvalidProvider(format!("{} - poll interval must be positive", label)));
        }

        Ok(Self {
            label: label.to_string(),
            url: url.to_string(),
            parser: FeedParser::new(label),
            fetcher,
            poll_interval,
            last_etag: None,
            last_modified: None,
            pending: None,
        })
    }

    pub fn from_provider(provider: &Provider, fetcher: Fetcher) -> Result<Self> {
        Self::new(
            &provider.label,
            &provider.feed_url,
            Duration::from_secs(provider.poll_frequency_seconds),
            fetcher,
        )
    }
}

#[async_trait]
impl PullFeed for RssFeedSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn pull(&mut self) -> Result<Vec<Article>> {
        debug!("Pulling RSS feed: {}", self.url);
        self.pending = None;

        let fetch_result = self
            .fetcher
            .fetch_feed(&self.url, self.last_etag.as_deref(), self.last_modified.as_deref())
            .await?;

        self.pending = Some((fetch_result.etag, fetch_result.last_modified));

        let content = match fetch_result.content {
            Some(content) => content,
            None => {
                debug!("{} - feed unchanged since last poll", self.label);
                return Ok(Vec::new());
            }
        };

        if !FeedParser::is_valid_feed_content(&content) {
            warn!("{} - response from {} does not look like a feed", self.label, self.url);
            return Err(AggregatorError::Parse(format!("{} is not an RSS or Atom document", self.url)));
        }

        let articles = self.parser.parse_articles(&content)?;
        info!("Pulled {} articles from RSS feed {}", articles.len(), self.url);
        Ok(articles)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn commit(&mut self) {
        if let Some((etag, last_modified)) = self.pending.take() {
            self.last_etag = etag;
            self.last_modified = last_modified;
        }
    }
}
