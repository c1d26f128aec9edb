use crate::sources::RssFeedSource;
use crate::traits::PullFeed;
use crate::types::{AggregatorError, FetchConfig, Provider, Result};
use crate::Fetcher;
use std::collections::HashMap;

/// Builds the fetch side of a job from a stored provider.
pub type ProviderConstructor = Box<dyn Fn(&Provider) -> Result<Box<dyn PullFeed>> + Send + Sync>;

/// Maps a provider type (`"rss"`, ...) to the constructor of its feed source.
///
/// Adding a provider type means registering one more constructor here; the
/// aggregator itself never names a concrete source.
#[derive(Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider type.
    pub fn with_defaults(fetch_config: FetchConfig) -> Result<Self> {
        let fetcher = Fetcher::new(fetch_config)?;
        let mut registry = Self::new();
        registry.register("rss", move |provider: &Provider| {
            let source = RssFeedSource::from_provider(provider, fetcher.clone())?;
            Ok(Box::new(source) as Box<dyn PullFeed>)
        });
        Ok(registry)
    }

    pub fn register<F>(&mut self, provider_type: &str, constructor: F)
    where
        F: Fn(&Provider) -> Result<Box<dyn PullFeed>> + Send + Sync + 'static,
    {
        self.constructors.insert(provider_type.to_string(), Box::new(constructor));
    }

    pub fn supports(&self, provider_type: &str) -> bool {
        self.constructors.contains_key(provider_type)
    }

    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn build(&self, provider: &Provider) -> Result<Box<dyn PullFeed>> {
        match self.constructors.get(&provider.provider_type) {
            Some(constructor) => constructor(provider),
            None => Err(AggregatorError::UnsupportedProviderType {
                provider_type: provider.provider_type.clone(),
            }),
        }
    }
}
