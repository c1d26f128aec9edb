use crate::types::{Article, Provider, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Trait for pulling articles from a provider (RSS feeds, APIs, etc.)
#[async_trait]
pub trait PullFeed: Send + Sync {
    /// Human-readable label of the provider, also stamped on every article
    fn label(&self) -> &str;

    /// Fetch the latest articles the provider currently exposes
    async fn pull(&mut self) -> Result<Vec<Article>>;

    /// How long to wait between two calls to `pull`
    fn poll_interval(&self) -> Duration;

    /// Called once the articles returned by the last `pull` have been stored.
    /// Sources that fetch conditionally only move their cache validators here,
    /// so a failed store is retried in full on the next pull.
    fn commit(&mut self) {}
}

/// Storage of articles. Inserting is an upsert keyed on the article guid.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<String>>;

    async fn get_articles(
        &self,
        offset: usize,
        count: usize,
        categories: &[String],
        providers: &[String],
    ) -> Result<Vec<Article>>;
}

/// Storage of providers.
///
/// `get_provider` must return `AggregatorError::ProviderNotFound` for an
/// unknown id so callers can tell it apart from other failures.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn insert_providers(&self, providers: &[Provider]) -> Result<Vec<String>>;

    async fn get_providers(&self, offset: usize, limit: usize) -> Result<Vec<Provider>>;

    async fn get_provider(&self, id: &str) -> Result<Provider>;
}

/// Callback invoked once per message delivered on a subscribed topic.
///
/// Deliveries may overlap, so implementations must tolerate concurrent calls.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Vec<u8>);
}

/// Handle returned by `NotificationBus::subscribe`, consumed by `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub topic: String,
}

impl Subscription {
    pub fn new(topic: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
        }
    }
}

/// Publish/subscribe transport used to announce new providers.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<Subscription>;

    async fn unsubscribe(&self, subscription: Subscription) -> Result<()>;

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}
