use crate::traits::{MessageHandler, NotificationBus, Subscription};
use crate::types::{AggregatorError, Result};
use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Publish/subscribe over PostgreSQL `LISTEN` / `NOTIFY`.
///
/// Each subscription holds its own listener connection, closed on unsubscribe.
pub struct PgBus {
    db: PgPool,
    subscriptions: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl PgBus {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl NotificationBus for PgBus {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<Subscription> {
        let subscribe_error = |e: sqlx::Error| AggregatorError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let mut listener = PgListener::connect_with(&self.db).await.map_err(subscribe_error)?;
        listener.listen(topic).await.map_err(subscribe_error)?;

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
                    notification = listener.recv() => match notification {
                        Ok(notification) => {
                            let payload = notification.payload().as_bytes().to_vec();
                            let handler = handler.clone();
                            tokio::spawn(async move { handler.handle(payload).await });
                        }
                        Err(e) => {
                            // The listener reconnects on its own; just avoid spinning
                            error!("Receiving on `{}` failed: {}", topic_name, e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    },
                }
            }
            if let Err(e) = listener.unlisten(&topic_name).await {
                debug!("UNLISTEN `{}` failed: {}", topic_name, e);
            }
        });

        info!("Listening for `{}` notifications", topic);
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        match self.subscriptions.write().await.remove(&subscription.id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(AggregatorError::Unsubscribe {
                topic: subscription.topic,
                reason: format!("unknown subscription {}", subscription.id),
            }),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let payload = std::str::from_utf8(payload).map_err(|e| AggregatorError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&self.db)
            .await?;

        debug!("Published to `{}`", topic);
        Ok(())
    }
}
