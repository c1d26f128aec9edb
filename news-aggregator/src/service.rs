use crate::sources::ProviderRegistry;
use crate::traits::{ArticleRepository, NotificationBus, ProviderRepository};
use crate::types::{AggregatorError, Article, PollLimits, Provider, Result, NEW_PROVIDER_TOPIC};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Largest page `articles` will return
pub const MAX_PAGE_SIZE: usize = 50;
/// Page size used when the requested one is out of range
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Operator-facing operations: registering providers and reading articles.
pub struct SourceService {
    articles: Arc<dyn ArticleRepository>,
    providers: Arc<dyn ProviderRepository>,
    bus: Arc<dyn NotificationBus>,
    registry: Arc<ProviderRegistry>,
    limits: PollLimits,
}

impl SourceService {
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        providers: Arc<dyn ProviderRepository>,
        bus: Arc<dyn NotificationBus>,
        registry: Arc<ProviderRegistry>,
        limits: PollLimits,
    ) -> Self {
        Self {
            articles,
            providers,
            bus,
            registry,
            limits,
        }
    }

    /// Validate and store a provider, then announce it so a running
    /// aggregator starts polling it. Returns the new provider id.
    ///
    /// A provider is only stored if the registry can build a feed source
    /// from it, the same check the job factory applies at startup.
    pub async fn register_source(
        &self,
        provider_type: &str,
        label: &str,
        feed_url: &str,
        poll_frequency_seconds: u64,
    ) -> Result<String> {
        if !self.registry.supports(provider_type) {
            warn!(
                "Rejecting provider type `{}`, supported types: {}",
                provider_type,
                self.registry.supported_types().join(", ")
            );
            return Err(AggregatorError::UnsupportedProviderType {
                provider_type: provider_type.to_string(),
            });
        }
        if label.trim().is_empty() {
            return Err(AggregatorError::InvalidProvider("label is required".to_string()));
        }
        let parsed = Url::parse(feed_url)?;
        if parsed.host().is_none() {
            return Err(AggregatorError::InvalidProvider(format!("feed URL `{}` has no host", feed_url)));
        }

        let poll = self.limits.clamp(poll_frequency_seconds);
        if poll_frequency_seconds == 0 || poll == 0 {
            return Err(AggregatorError::InvalidProvider(format!(
                "poll frequency for `{}` must be positive",
                label
            )));
        }
        if poll != poll_frequency_seconds {
            warn!(
                "Poll frequency {}s for `{}` clamped to {}s",
                poll_frequency_seconds, label, poll
            );
        }

        let provider = Provider {
            id: String::new(),
            provider_type: provider_type.to_string(),
            label: label.trim().to_string(),
            feed_url: feed_url.to_string(),
            poll_frequency_seconds: poll,
        };
        self.registry.build(&provider)?;

        let id = self
            .providers
            .insert_providers(std::slice::from_ref(&provider))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AggregatorError::General("provider store returned no id".to_string()))?;

        info!("Registered provider `{}` with id `{}`", provider.label, id);

        // Already stored, the next restart picks it up
        if let Err(e) = self.bus.publish(NEW_PROVIDER_TOPIC, id.as_bytes()).await {
            warn!("Unable to announce provider `{}` - {}", id, e);
        }

        Ok(id)
    }

    /// A page of stored articles, optionally filtered by category and provider.
    pub async fn articles(
        &self,
        offset: i64,
        count: i64,
        categories: &[String],
        providers: &[String],
    ) -> Result<Vec<Article>> {
        let count = if count < 1 || count as usize > MAX_PAGE_SIZE {
            DEFAULT_PAGE_SIZE
        } else {
            count as usize
        };
        let offset = offset.max(0) as usize;

        self.articles.get_articles(offset, count, categories, providers).await
    }
}
