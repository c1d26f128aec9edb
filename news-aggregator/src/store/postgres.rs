use crate::traits::{ArticleRepository, ProviderRepository};
use crate::types::{AggregatorError, Article, Provider, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// PostgreSQL backed article and provider storage.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    fn article_from_row(row: &PgRow) -> Result<Article> {
        let categories_json: serde_json::Value = row.try_get("categories")?;
        let categories: Vec<String> = serde_json::from_value(categories_json)?;

        Ok(Article {
            title: row.try_get("title")?,
            link: row.try_get("link")?,
            description: row.try_get("description")?,
            published: row.try_get::<Option<DateTime<Utc>>, _>("published")?,
            guid: row.try_get("guid")?,
            thumbnail: row.try_get("thumbnail")?,
            categories,
            provider: row.try_get("provider")?,
        })
    }

    fn provider_from_row(row: &PgRow) -> Result<Provider> {
        let seconds: i64 = row.try_get("poll_frequency_seconds")?;
        Ok(Provider {
            id: row.try_get("id")?,
            provider_type: row.try_get("provider_type")?,
            label: row.try_get("label")?,
            feed_url: row.try_get("feed_url")?,
            poll_frequency_seconds: seconds.max(0) as u64,
        })
    }
}

#[async_trait]
impl ArticleRepository for PgStore {
    /// Upsert keyed on guid, so re-polling the same item only refreshes it.
    async fn insert_articles(&self, articles: &[Article]) -> Result<Vec<String>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.db.begin().await?;
        let mut guids = Vec::with_capacity(articles.len());

        for article in articles {
            sqlx::query(
                r#"
                INSERT INTO articles (guid, title, link, description, published, thumbnail, categories, provider)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (guid) DO UPDATE SET
                    title = EXCLUDED.title,
                    link = EXCLUDED.link,
                    description = EXCLUDED.description,
                    published = EXCLUDED.published,
                    thumbnail = EXCLUDED.thumbnail,
                    categories = EXCLUDED.categories,
                    provider = EXCLUDED.provider,
                    updated_at = NOW()
                "#,
            )
            .bind(&article.guid)
            .bind(&article.title)
            .bind(&article.link)
            .bind(&article.description)
            .bind(article.published)
            .bind(&article.thumbnail)
            .bind(serde_json::to_value(&article.categories)?)
            .bind(&article.provider)
            .execute(&mut *tx)
            .await?;

            guids.push(article.guid.clone());
        }

        tx.commit().await?;
        debug!("Upserted {} articles", guids.len());
        Ok(guids)
    }

    async fn get_articles(
        &self,
        offset: usize,
        count: usize,
        categories: &[String],
        providers: &[String],
    ) -> Result<Vec<Article>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, title, link, description, published, thumbnail, categories, provider
            FROM articles
            WHERE (cardinality($1::text[]) = 0 OR categories ?| $1::text[])
              AND (cardinality($2::text[]) = 0 OR provider = ANY($2::text[]))
            ORDER BY published DESC NULLS LAST, created_at DESC
            OFFSET $3
            LIMIT $4
            "#,
        )
        .bind(categories)
        .bind(providers)
        .bind(offset as i64)
        .bind(count as i64)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::article_from_row).collect()
    }
}

#[async_trait]
impl ProviderRepository for PgStore {
    async fn insert_providers(&self, providers: &[Provider]) -> Result<Vec<String>> {
        let mut tx = self.db.begin().await?;
        let mut ids = Vec::with_capacity(providers.len());

        for provider in providers {
            let id = if provider.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                provider.id.clone()
            };

            sqlx::query(
                r#"
                INSERT INTO providers (id, provider_type, label, feed_url, poll_frequency_seconds)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&id)
            .bind(&provider.provider_type)
            .bind(&provider.label)
            .bind(&provider.feed_url)
            .bind(provider.poll_frequency_seconds as i64)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
        info!("Inserted {} providers", ids.len());
        Ok(ids)
    }

    async fn get_providers(&self, offset: usize, limit: usize) -> Result<Vec<Provider>> {
        let rows = sqlx::query(
            r#"
            SELECT id, provider_type, label, feed_url, poll_frequency_seconds
            FROM providers
            ORDER BY created_at, id
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::provider_from_row).collect()
    }

    async fn get_provider(&self, id: &str) -> Result<Provider> {
        let row = sqlx::query(
            "SELECT id, provider_type, label, feed_url, poll_frequency_seconds FROM providers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Self::provider_from_row(&row),
            None => Err(AggregatorError::ProviderNotFound { id: id.to_string() }),
        }
    }
}
