use crate::traits::{MessageHandler, NotificationBus, Subscription};
use crate::types::{AggregatorError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const TOPIC_CAPACITY: usize = 100;

/// In-process publish/subscribe bus backed by one broadcast channel per topic.
///
/// Every delivery runs the handler on its own task, so a slow handler never
/// holds up the next message.
#[derive(Default)]
pub struct LocalBus {
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    subscriptions: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(sender) = self.topics.read().await.get(topic) {
            return sender.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[async_trait]
impl NotificationBus for LocalBus {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<Subscription> {
        let mut receiver = self.sender(topic).await.subscribe();
        let subscription = Subscription::new(topic);
        let token = CancellationToken::new();

        self.subscriptions
            .write()
            .await
            .insert(subscription.id, token.clone());

        let topic_name = topic.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    message = receiver.recv() => match message {
                        Ok(payload) => {
                            let handler = handler.clone();
                            tokio::spawn(async move { handler.handle(payload).await });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Subscriber on `{}` lagged, {} messages dropped", topic_name, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Delivery loop for `{}` finished", topic_name);
        });

        debug!("Subscribed to `{}` ({})", topic, subscription.id);
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        match self.subscriptions.write().await.remove(&subscription.id) {
            Some(token) => {
                token.cancel();
                debug!("Unsubscribed from `{}` ({})", subscription.topic, subscription.id);
                Ok(())
            }
            None => Err(AggregatorError::Unsubscribe {
                topic: subscription.topic,
                reason: format!("unknown subscription {}", subscription.id),
            }),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let sender = self.sender(topic).await;
        // No receivers is not an error, the event simply has no audience
        if sender.send(payload.to_vec()).is_err() {
            debug!("Published to `{}` with no subscribers", topic);
        }
        Ok(())
    }
}
