#![allow(dead_code)]

use async_trait::async_trait;
use news_aggregator::{
    AggregatorError, Article, ArticleRepository, LocalBus, MemoryStore, MessageHandler, NotificationBus, Provider,
    ProviderRegistry, ProviderRepository, PullFeed, Result, Subscription,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

pub const FAKE_TYPE: &str = "fake";

/// Feed that hands out `items` fresh articles per pull, or always fails.
pub struct FakeFeed {
    label: String,
    items: usize,
    fail: bool,
    interval: Duration,
    pulls: Arc<AtomicUsize>,
}

impl FakeFeed {
    pub fn new(label: &str, items: usize, interval: Duration) -> Self {
        Self {
            label: label.to_string(),
            items,
            fail: false,
            interval,
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(label: &str, interval: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(label, 0, interval)
        }
    }

    pub fn with_counter(mut self, pulls: Arc<AtomicUsize>) -> Self {
        self.pulls = pulls;
        self
    }

    pub fn pulls(&self) -> Arc<AtomicUsize> {
        self.pulls.clone()
    }
}

#[async_trait]
impl PullFeed for FakeFeed {
    fn label(&self) -> &str {
        &self.label
    }

    async fn pull(&mut self) -> Result<Vec<Article>> {
        let round = self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AggregatorError::General(format!("{} is unreachable", self.label)));
        }

        Ok((0..self.items)
            .map(|i| Article {
                title: format!("{} story {}", self.label, i),
                guid: format!("{}-{}-{}", self.label, round, i),
                provider: self.label.clone(),
                ..Article::default()
            })
            .collect())
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}

/// Article store that remembers the size of every insert call.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    insert_sizes: Mutex<Vec<usize>>,
}

impl RecordingStore {
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.insert_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleRepository for RecordingStore {
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<String>> {
        self.insert_sizes.lock().unwrap().push(articles.len());
        self.inner.insert_articles(articles).await
    }

    async fn get_articles(
        &self,
        offset: usize,
        count: usize,
        categories: &[String],
        providers: &[String],
    ) -> Result<Vec<Article>> {
        self.inner.get_articles(offset, count, categories, providers).await
    }
}

/// Article store whose first `failures` inserts error out.
pub struct FlakyStore {
    pub inner: MemoryStore,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleRepository for FlakyStore {
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<String>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AggregatorError::General("database unavailable".to_string()));
        }
        self.inner.insert_articles(articles).await
    }

    async fn get_articles(
        &self,
        offset: usize,
        count: usize,
        categories: &[String],
        providers: &[String],
    ) -> Result<Vec<Article>> {
        self.inner.get_articles(offset, count, categories, providers).await
    }
}

/// Feed that behaves like a conditional GET: once a pull has been committed
/// it returns nothing until the upstream content changes.
pub struct CachingFeed {
    label: String,
    interval: Duration,
    upstream_version: u32,
    committed: Option<u32>,
    pending: Option<u32>,
}

impl CachingFeed {
    pub fn new(label: &str, interval: Duration) -> Self {
        Self {
            label: label.to_string(),
            interval,
            upstream_version: 1,
            committed: None,
            pending: None,
        }
    }
}

#[async_trait]
impl PullFeed for CachingFeed {
    fn label(&self) -> &str {
        &self.label
    }

    async fn pull(&mut self) -> Result<Vec<Article>> {
        self.pending = None;
        if self.committed == Some(self.upstream_version) {
            return Ok(Vec::new());
        }
        self.pending = Some(self.upstream_version);
        Ok(vec![Article {
            title: format!("{} headline", self.label),
            guid: format!("{}-v{}", self.label, self.upstream_version),
            provider: self.label.clone(),
            ..Article::default()
        }])
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    fn commit(&mut self) {
        if let Some(version) = self.pending.take() {
            self.committed = Some(version);
        }
    }
}

/// Local bus whose subscribe or unsubscribe can be made to fail.
#[derive(Default)]
pub struct FlakyBus {
    pub inner: LocalBus,
    pub fail_subscribe: AtomicBool,
    pub fail_unsubscribe: AtomicBool,
    unsubscribe_calls: AtomicUsize,
}

impl FlakyBus {
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationBus for FlakyBus {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(AggregatorError::Subscribe {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        self.inner.subscribe(topic, handler).await
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(AggregatorError::Unsubscribe {
                topic: subscription.topic,
                reason: "broker unavailable".to_string(),
            });
        }
        self.inner.unsubscribe(subscription).await
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.inner.publish(topic, payload).await
    }
}

/// Registry knowing only the `fake` type. Every feed it builds yields two
/// articles per pull and counts its pulls into `pulls`.
pub fn fake_registry(pulls: Arc<AtomicUsize>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(FAKE_TYPE, move |provider: &Provider| {
        let interval = Duration::from_secs(provider.poll_frequency_seconds);
        let feed = FakeFeed::new(&provider.label, 2, interval).with_counter(pulls.clone());
        Ok(Box::new(feed) as Box<dyn PullFeed>)
    });
    registry
}

pub fn provider(id: &str, provider_type: &str, label: &str) -> Provider {
    Provider {
        id: id.to_string(),
        provider_type: provider_type.to_string(),
        label: label.to_string(),
        feed_url: format!("https://{}.example.com/feed.xml", label.to_lowercase()),
        poll_frequency_seconds: 1,
    }
}

pub async fn store_with(providers: &[Provider]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_providers(providers).await.unwrap();
    store
}
