use crate::types::{AggregatorError, Article, Result};
use feed_rs::model::Entry;
use feed_rs::parser;
use tracing::debug;

/// Turns an RSS/Atom document into articles stamped with a provider label.
pub struct FeedParser {
    provider_label: String,
}

impl FeedParser {
    pub fn new(provider_label: impl Into<String>) -> Self {
        Self {
            provider_label: provider_label.into(),
        }
    }

    pub fn parse_articles(&self, content: &str) -> Result<Vec<Article>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| AggregatorError::Parse(format!("Failed to parse feed: {}", e)))?;

        let articles: Vec<Article> = feed
            .entries
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect();

        debug!("{} - parsed {} articles", self.provider_label, articles.len());
        Ok(articles)
    }

    fn parse_entry(&self, entry: Entry) -> Option<Article> {
        let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();

        // Without a guid or a link there is nothing to key the article on
        let guid = if !entry.id.is_empty() {
            entry.id.clone()
        } else if !link.is_empty() {
            link.clone()
        } else {
            debug!("Skipping entry without id or link");
            return None;
        };

        let thumbnail = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone())
            .next();

        Some(Article {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link,
            description: entry.summary.map(|s| s.content).unwrap_or_default(),
            published: entry.published.or(entry.updated),
            guid,
            thumbnail,
            categories: entry.categories.into_iter().map(|c| c.term).collect(),
            provider: self.provider_label.clone(),
        })
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<channel")
            || content_lower.contains("xmlns=\"http://www.w3.org/2005/atom\"")
    }
}
