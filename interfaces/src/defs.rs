use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic on which the id of a freshly stored provider is announced.
pub const NEW_PROVIDER_TOPIC: &str = "new-provider";

/// A news provider, i.e. one external feed and how often to poll it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub label: String,
    #[serde(rename = "feedURL")]
    pub feed_url: String,
    #[serde(rename = "pollFrequencySeconds")]
    pub poll_frequency_seconds: u64,
}

/// A single news article pulled from a provider.
///
/// `guid` is the natural key: storing the same guid twice updates the
/// existing record instead of adding a new one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
    pub guid: String,
    pub thumbnail: Option<String>,
    pub categories: Vec<String>,
    pub provider: String,
}

