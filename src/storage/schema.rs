use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StorageError;

// ============================================================================
// Database
// ============================================================================

/// sqlx/SQLite backend for the repository contract.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// Pass `":memory:"` for an ephemeral database (used throughout the
    /// test suite).
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Handles transient contention between
        // concurrent per-feed refresh transactions.
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");

        // SQLite is single-writer; 5 connections covers concurrent per-feed
        // reads during a refresh cycle.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running against an
    /// existing database is a no-op. If any step fails the transaction rolls
    /// back, leaving the previous schema intact.
    async fn migrate(&self) -> Result<(), StorageError> {
        // Per-connection setting, must run outside the transaction
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id TEXT PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                link TEXT,
                source_type TEXT NOT NULL,
                category TEXT,
                image_url TEXT,
                image_title TEXT,
                image_link TEXT,
                last_fetched INTEGER,
                number_of_items INTEGER NOT NULL DEFAULT 0,
                created_on INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_items (
                id TEXT PRIMARY KEY,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                description TEXT,
                published INTEGER,
                last_seen INTEGER NOT NULL,
                created_on INTEGER NOT NULL,
                UNIQUE(feed_id, link)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_items (
                id TEXT PRIMARY KEY,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_item_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                link TEXT NOT NULL,
                feed_title TEXT NOT NULL,
                favicon TEXT NOT NULL,
                published INTEGER NOT NULL,
                created_on INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                alternates TEXT NOT NULL DEFAULT '[]'
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email_address TEXT UNIQUE NOT NULL,
                number_of_unread_items INTEGER NOT NULL DEFAULT 0,
                created_on INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, feed_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Reconciliation reads stored items per feed on every refresh
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feed_items_feed ON feed_items(feed_id)")
            .execute(&mut *tx)
            .await?;

        // Unread working-set query: feed + user + is_read
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_news_items_unread ON news_items(feed_id, user_id, is_read)",
        )
        .execute(&mut *tx)
        .await?;

        // Per-user unread listing
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_news_items_user_read ON news_items(user_id, is_read)",
        )
        .execute(&mut *tx)
        .await?;

        // Fan-out resolves subscribers by feed
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscriptions_feed ON subscriptions(feed_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_and_remigrate() {
        let db = Database::open(":memory:").await.unwrap();
        // Migrations are idempotent
        db.migrate().await.unwrap();
    }
}
