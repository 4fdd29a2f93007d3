use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::repository::Repository;
use super::schema::Database;
use super::types::{Alternate, Feed, FeedItem, FeedSourceType, NewsItem, StorageError, User};

/// Rows per batched INSERT. SQLite caps bind parameters per statement;
/// 50 rows of our widest table stays well under the limit.
const BATCH_SIZE: usize = 50;

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct FeedRow {
    id: String,
    url: String,
    title: String,
    description: Option<String>,
    link: Option<String>,
    source_type: String,
    category: Option<String>,
    image_url: Option<String>,
    image_title: Option<String>,
    image_link: Option<String>,
    last_fetched: Option<i64>,
    number_of_items: i64,
    created_on: i64,
}

impl FeedRow {
    fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            url: self.url,
            title: self.title,
            description: self.description,
            link: self.link,
            source_type: FeedSourceType::from_str_lossy(&self.source_type),
            category: self.category,
            image_url: self.image_url,
            image_title: self.image_title,
            image_link: self.image_link,
            last_fetched: self.last_fetched.map(from_ts),
            number_of_items: self.number_of_items,
            created_on: from_ts(self.created_on),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedItemRow {
    id: String,
    feed_id: String,
    title: String,
    link: String,
    description: Option<String>,
    published: Option<i64>,
    last_seen: i64,
    created_on: i64,
}

impl FeedItemRow {
    fn into_feed_item(self) -> FeedItem {
        FeedItem {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            link: self.link,
            description: self.description,
            published: self.published.map(from_ts),
            last_seen: from_ts(self.last_seen),
            created_on: from_ts(self.created_on),
        }
    }
}

#[derive(sqlx::FromRow)]
struct NewsItemRow {
    id: String,
    feed_id: String,
    user_id: String,
    feed_item_id: String,
    title: String,
    description: Option<String>,
    link: String,
    feed_title: String,
    favicon: String,
    published: i64,
    created_on: i64,
    is_read: bool,
    alternates: String,
}

impl NewsItemRow {
    fn into_news_item(self) -> Result<NewsItem, StorageError> {
        let alternates: Vec<Alternate> = serde_json::from_str(&self.alternates)?;
        Ok(NewsItem {
            id: self.id,
            feed_id: self.feed_id,
            user_id: self.user_id,
            feed_item_id: self.feed_item_id,
            title: self.title,
            description: self.description,
            link: self.link,
            feed_title: self.feed_title,
            favicon: self.favicon,
            published: from_ts(self.published),
            created_on: from_ts(self.created_on),
            is_read: self.is_read,
            alternates,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email_address: String,
    number_of_unread_items: i64,
    created_on: i64,
}

impl UserRow {
    fn into_user(self, subscriptions: Vec<String>) -> User {
        User {
            id: self.id,
            email_address: self.email_address,
            number_of_unread_items: self.number_of_unread_items,
            subscriptions,
            created_on: from_ts(self.created_on),
        }
    }
}

// ============================================================================
// Repository Implementation
// ============================================================================

impl Database {
    /// Subscription rows for a set of users, grouped by user id.
    ///
    /// One query for the whole set instead of a lookup per user.
    async fn load_subscriptions(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, StorageError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT user_id, feed_id FROM subscriptions WHERE user_id IN (");
        let mut separated = builder.separated(", ");
        for id in user_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (user_id, feed_id) in rows {
            map.entry(user_id).or_default().push(feed_id);
        }
        Ok(map)
    }

    async fn users_from_rows(&self, rows: Vec<UserRow>) -> Result<Vec<User>, StorageError> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut subscriptions = self.load_subscriptions(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let subs = subscriptions.remove(&row.id).unwrap_or_default();
                row.into_user(subs)
            })
            .collect())
    }
}

#[async_trait]
impl Repository for Database {
    async fn fetch_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT id, url, title, description, link, source_type, category,
                    image_url, image_title, image_link, last_fetched,
                    number_of_items, created_on
             FROM feeds",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    async fn fetch_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StorageError> {
        let row: Option<FeedRow> = sqlx::query_as(
            "SELECT id, url, title, description, link, source_type, category,
                    image_url, image_title, image_link, last_fetched,
                    number_of_items, created_on
             FROM feeds WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FeedRow::into_feed))
    }

    async fn upsert_feed(&self, feed: &Feed) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, title, description, link, source_type,
                               category, image_url, image_title, image_link,
                               last_fetched, number_of_items, created_on)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                description = excluded.description,
                link = excluded.link,
                source_type = excluded.source_type,
                category = excluded.category,
                image_url = excluded.image_url,
                image_title = excluded.image_title,
                image_link = excluded.image_link,
                last_fetched = excluded.last_fetched,
                number_of_items = excluded.number_of_items
        "#,
        )
        .bind(&feed.id)
        .bind(&feed.url)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.link)
        .bind(feed.source_type.as_str())
        .bind(&feed.category)
        .bind(&feed.image_url)
        .bind(&feed.image_title)
        .bind(&feed.image_link)
        .bind(feed.last_fetched.map(to_ts))
        .bind(feed.number_of_items)
        .bind(to_ts(feed.created_on))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_feed_items(&self, feed: &Feed) -> Result<Vec<FeedItem>, StorageError> {
        let rows: Vec<FeedItemRow> = sqlx::query_as(
            "SELECT id, feed_id, title, link, description, published, last_seen, created_on
             FROM feed_items WHERE feed_id = ?",
        )
        .bind(&feed.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FeedItemRow::into_feed_item).collect())
    }

    async fn upsert_feed_items(&self, items: &[FeedItem]) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in items.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO feed_items (id, feed_id, title, link, description,
                                         published, last_seen, created_on) ",
            );
            builder.push_values(chunk, |mut b, item| {
                b.push_bind(&item.id)
                    .push_bind(&item.feed_id)
                    .push_bind(&item.title)
                    .push_bind(&item.link)
                    .push_bind(&item.description)
                    .push_bind(item.published.map(to_ts))
                    .push_bind(to_ts(item.last_seen))
                    .push_bind(to_ts(item.created_on));
            });
            // Conflicts resolve on the dedup key (feed_id, link) so a replayed
            // reconciliation refreshes the stored row instead of duplicating it,
            // keeping the original id and created_on.
            builder.push(
                " ON CONFLICT(feed_id, link) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    published = excluded.published,
                    last_seen = excluded.last_seen",
            );
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_unread_news_items(
        &self,
        feed: &Feed,
        user: &User,
    ) -> Result<Vec<NewsItem>, StorageError> {
        let rows: Vec<NewsItemRow> = sqlx::query_as(
            "SELECT id, feed_id, user_id, feed_item_id, title, description, link,
                    feed_title, favicon, published, created_on, is_read, alternates
             FROM news_items
             WHERE feed_id = ? AND user_id = ? AND is_read = 0",
        )
        .bind(&feed.id)
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NewsItemRow::into_news_item).collect()
    }

    async fn fetch_news_items(&self, ids: &[String]) -> Result<Vec<NewsItem>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, feed_id, user_id, feed_item_id, title, description, link,
                    feed_title, favicon, published, created_on, is_read, alternates
             FROM news_items WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<NewsItemRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(NewsItemRow::into_news_item).collect()
    }

    async fn upsert_news_items(&self, items: &[NewsItem]) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }

        // Serialize alternates up front so a bad row aborts before the
        // transaction opens
        let mut encoded: Vec<(&NewsItem, String)> = Vec::with_capacity(items.len());
        for item in items {
            encoded.push((item, serde_json::to_string(&item.alternates)?));
        }

        let mut tx = self.pool.begin().await?;
        for chunk in encoded.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO news_items (id, feed_id, user_id, feed_item_id, title,
                                         description, link, feed_title, favicon,
                                         published, created_on, is_read, alternates) ",
            );
            builder.push_values(chunk, |mut b, (item, alternates)| {
                b.push_bind(&item.id)
                    .push_bind(&item.feed_id)
                    .push_bind(&item.user_id)
                    .push_bind(&item.feed_item_id)
                    .push_bind(&item.title)
                    .push_bind(&item.description)
                    .push_bind(&item.link)
                    .push_bind(&item.feed_title)
                    .push_bind(&item.favicon)
                    .push_bind(to_ts(item.published))
                    .push_bind(to_ts(item.created_on))
                    .push_bind(item.is_read)
                    .push_bind(alternates);
            });
            builder.push(
                " ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    link = excluded.link,
                    feed_title = excluded.feed_title,
                    favicon = excluded.favicon,
                    published = excluded.published,
                    is_read = excluded.is_read,
                    alternates = excluded.alternates",
            );
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_users_subscribed_to(&self, feed: &Feed) -> Result<Vec<User>, StorageError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT u.id, u.email_address, u.number_of_unread_items, u.created_on
             FROM users u
             JOIN subscriptions s ON s.user_id = u.id
             WHERE s.feed_id = ?",
        )
        .bind(&feed.id)
        .fetch_all(&self.pool)
        .await?;
        self.users_from_rows(rows).await
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email_address, number_of_unread_items, created_on
             FROM users WHERE email_address = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(self.users_from_rows(vec![row]).await?.into_iter().next()),
        }
    }

    async fn upsert_users(&self, users: &[User]) -> Result<(), StorageError> {
        if users.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for user in users {
            sqlx::query(
                r#"
                INSERT INTO users (id, email_address, number_of_unread_items, created_on)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    email_address = excluded.email_address,
                    number_of_unread_items = excluded.number_of_unread_items
            "#,
            )
            .bind(&user.id)
            .bind(&user.email_address)
            .bind(user.number_of_unread_items)
            .bind(to_ts(user.created_on))
            .execute(&mut *tx)
            .await?;

            // Subscriptions are authoritative on the User value: rewrite the
            // join rows to match
            sqlx::query("DELETE FROM subscriptions WHERE user_id = ?")
                .bind(&user.id)
                .execute(&mut *tx)
                .await?;
            for feed_id in &user.subscriptions {
                sqlx::query("INSERT OR IGNORE INTO subscriptions (user_id, feed_id) VALUES (?, ?)")
                    .bind(&user.id)
                    .bind(feed_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
