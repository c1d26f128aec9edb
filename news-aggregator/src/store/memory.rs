use crate::traits::{ArticleRepository, ProviderRepository};
use crate::types::{AggregatorError, Article, Provider, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct ArticleTable {
    // guid in first-seen order
    order: Vec<String>,
    by_guid: HashMap<String, Article>,
}

/// In-process article and provider storage.
#[derive(Default)]
pub struct MemoryStore {
    articles: RwLock<ArticleTable>,
    providers: RwLock<Vec<Provider>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn article_count(&self) -> usize {
        self.articles.read().await.by_guid.len()
    }
}

#[async_trait]
impl ArticleRepository for MemoryStore {
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<String>> {
        let mut table = self.articles.write().await;
        let mut guids = Vec::with_capacity(articles.len());

        for article in articles {
            if table.by_guid.insert(article.guid.clone(), article.clone()).is_none() {
                table.order.push(article.guid.clone());
            }
            guids.push(article.guid.clone());
        }

        Ok(guids)
    }

    async fn get_articles(
        &self,
        offset: usize,
        count: usize,
        categories: &[String],
        providers: &[String],
    ) -> Result<Vec<Article>> {
        let table = self.articles.read().await;

        let mut matching: Vec<(usize, &Article)> = table
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, guid)| table.by_guid.get(guid).map(|a| (position, a)))
            .filter(|(_, a)| providers.is_empty() || providers.contains(&a.provider))
            .filter(|(_, a)| categories.is_empty() || a.categories.iter().any(|c| categories.contains(c)))
            .collect();

        // Newest first, undated last, ties broken by most recently stored
        matching.sort_by(|(pos_a, a), (pos_b, b)| {
            b.published
                .cmp(&a.published)
                .then_with(|| pos_b.cmp(pos_a))
        });

        Ok(matching
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(_, a)| a.clone())
            .collect())
    }
}

#[async_trait]
impl ProviderRepository for MemoryStore {
    async fn insert_providers(&self, providers: &[Provider]) -> Result<Vec<String>> {
        let mut stored = self.providers.write().await;
        let mut ids = Vec::with_capacity(providers.len());

        for provider in providers {
            let mut provider = provider.clone();
            if provider.id.is_empty() {
                provider.id = Uuid::new_v4().to_string();
            }
            if stored.iter().any(|p| p.id == provider.id) {
                return Err(AggregatorError::InvalidProvider(format!("duplicate provider id `{}`", provider.id)));
            }
            ids.push(provider.id.clone());
            stored.push(provider);
        }

        Ok(ids)
    }

    async fn get_providers(&self, offset: usize, limit: usize) -> Result<Vec<Provider>> {
        let stored = self.providers.read().await;
        Ok(stored.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get_provider(&self, id: &str) -> Result<Provider> {
        let stored = self.providers.read().await;
        stored
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| AggregatorError::ProviderNotFound { id: id.to_string() })
    }
}
