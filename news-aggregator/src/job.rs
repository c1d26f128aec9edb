use crate::traits::{ArticleRepository, PullFeed};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// A runnable task that keeps pulling articles from one provider and storing them.
pub struct Job {
    id: Uuid,
    label: String,
    provider: Box<dyn PullFeed>,
    articles: Arc<dyn ArticleRepository>,
    stop: CancellationToken,
}

impl Job {
    pub fn new(label: impl Into<String>, provider: Box<dyn PullFeed>, articles: Arc<dyn ArticleRepository>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            provider,
            articles,
            stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Token that ends the loop once cancelled. Cancelling never blocks.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Poll, store, wait; until stopped.
    ///
    /// Fetch and store failures are logged and the loop carries on at the next
    /// interval. The provider is only told to commit after a successful store.
    /// A stop raised while waiting ends the loop straight away; one raised
    /// during a fetch or store is seen at the top of the next iteration.
    pub async fn run(mut self) {
        info!("Starting job: {}", self.label);

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            match self.provider.pull().await {
                Ok(latest) => {
                    info!("{} - Received {} articles", self.label, latest.len());
                    match self.articles.insert_articles(&latest).await {
                        Ok(_) => self.provider.commit(),
                        Err(e) => error!("Saving articles - Job: {} Error: {}", self.label, e),
                    }
                }
                Err(e) => {
                    error!("{} - get latest - {}", self.label, e);
                }
            }

            let interval = self.provider.poll_interval();
            debug!("{} - next poll in {:?}", self.label, interval);

            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Stopping job: {}", self.label);
    }
}
