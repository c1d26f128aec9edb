pub mod aggregator;
pub mod bus;
pub mod config;
pub mod factory;
pub mod fetcher;
pub mod job;
pub mod parser;
pub mod service;
pub mod sources;
pub mod store;
pub mod supervisor;
pub mod traits;
pub mod types;

pub use aggregator::{Aggregator, AggregatorState};
pub use bus::{LocalBus, PgBus};
pub use factory::{build_job, build_jobs};
pub use fetcher::Fetcher;
pub use job::Job;
pub use parser::FeedParser;
pub use service::SourceService;
pub use sources::{ProviderRegistry, RssFeedSource};
pub use store::{MemoryStore, PgStore};
pub use supervisor::{JobSupervisor, SupervisorHandle};
pub use traits::*;
pub use types::*;
