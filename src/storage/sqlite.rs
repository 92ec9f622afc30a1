use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;
use std::time::Duration;

use super::{AdStore, SubscriptionStore};
use crate::config::DatabaseConfig;
use crate::models::{generate_id, Ad, Confirmation, Snapshot, SubscriptionDetails};
use crate::Result;

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens the pool described by `config` and applies pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect(&config.url)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        tracing::info!("Connected to database at {}", config.url);
        Ok(storage)
    }

    /// Single-connection in-memory database, migrated.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn get_ad(&self, ad_id: &str) -> Result<Option<Ad>> {
        let ad = sqlx::query_as::<_, Ad>(
            "SELECT id, link, name, price, is_removed, last_checked FROM ads WHERE id = ?",
        )
        .bind(ad_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ad)
    }
}

#[async_trait]
impl AdStore for SqliteStorage {
    async fn list_active_ads(&self, limit: u32) -> Result<Vec<Ad>> {
        let ads = sqlx::query_as::<_, Ad>(
            "SELECT id, link, name, price, is_removed, last_checked FROM ads \
             WHERE is_removed = 0 ORDER BY last_checked ASC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(ads)
    }

    async fn mark_removed(&self, ad_id: &str) -> Result<()> {
        sqlx::query("UPDATE ads SET is_removed = 1 WHERE id = ?")
            .bind(ad_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_price(&self, ad_id: &str, new_price: i64) -> Result<()> {
        sqlx::query("UPDATE ads SET price = ? WHERE id = ?")
            .bind(new_price)
            .bind(ad_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribers_of(&self, ad_id: &str) -> Result<Vec<String>> {
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT email FROM confirmations \
             WHERE ad_id = ? AND is_confirmed = 1 ORDER BY email",
        )
        .bind(ad_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }

    async fn batch_mark_checked(&self, ad_ids: &BTreeSet<String>) -> Result<()> {
        if ad_ids.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE ads SET last_checked = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE id IN (");
        let mut ids = builder.separated(", ");
        for id in ad_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        tracing::debug!("Marked {} ads as checked", result.rows_affected());
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStorage {
    async fn is_subscribed(&self, link: &str, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM confirmations c INNER JOIN ads a ON c.ad_id = a.id \
             WHERE a.link = ? AND c.email = ? AND a.is_removed = 0 AND c.is_confirmed = 1",
        )
        .bind(link)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn create_subscription(
        &self,
        link: &str,
        snapshot: &Snapshot,
        email: &str,
    ) -> Result<String> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ad_id: String = sqlx::query_scalar(
            "INSERT INTO ads (id, link, name, price, is_removed, created_at) \
             VALUES (?, ?, ?, ?, 0, ?) \
             ON CONFLICT (link) WHERE is_removed = 0 DO UPDATE SET link = excluded.link \
             RETURNING id",
        )
        .bind(generate_id())
        .bind(link)
        .bind(&snapshot.name)
        .bind(snapshot.price)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let pending: Option<String> = sqlx::query_scalar(
            "SELECT id FROM confirmations \
             WHERE ad_id = ? AND email = ? AND is_confirmed = 0 LIMIT 1",
        )
        .bind(&ad_id)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        let confirmation_id = match pending {
            Some(id) => id,
            None => {
                let id = generate_id();
                sqlx::query(
                    "INSERT INTO confirmations (id, email, ad_id, is_confirmed, created_at) \
                     VALUES (?, ?, ?, 0, ?)",
                )
                .bind(&id)
                .bind(email)
                .bind(&ad_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        tx.commit().await?;
        Ok(confirmation_id)
    }

    async fn get_confirmation(&self, id: &str) -> Result<Option<Confirmation>> {
        let confirmation = sqlx::query_as::<_, Confirmation>(
            "SELECT id, email, ad_id, is_confirmed, created_at FROM confirmations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(confirmation)
    }

    async fn confirm(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE confirmations SET is_confirmed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscription_details(&self, id: &str) -> Result<Option<SubscriptionDetails>> {
        let details = sqlx::query_as::<_, SubscriptionDetails>(
            "SELECT c.email, a.name FROM confirmations c \
             INNER JOIN ads a ON c.ad_id = a.id WHERE c.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(details)
    }

    async fn find_confirmed(&self, email: &str, link: &str) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT c.id FROM confirmations c INNER JOIN ads a ON c.ad_id = a.id \
             WHERE c.email = ? AND a.link = ? AND a.is_removed = 0 AND c.is_confirmed = 1 LIMIT 1",
        )
        .bind(email)
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn unconfirm(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE confirmations SET is_confirmed = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
