pub mod registry;
pub mod rss_feed;

pub use registry::{ProviderConstructor, ProviderRegistry};
pub use rss_feed::RssFeedSource;
