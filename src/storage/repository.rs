use async_trait::async_trait;

use super::types::{Feed, FeedItem, NewsItem, StorageError, User};

/// Persistence contract the aggregation core depends on.
///
/// The reconciler, fan-out, and scheduler receive an implementation at
/// construction; nothing in the core reaches for a process-wide handle.
/// Two implementations ship with the crate: the sqlx/SQLite
/// [`Database`](super::Database) for real deployments and
/// [`MemoryRepository`](super::MemoryRepository) for tests and ephemeral
/// runs.
///
/// Every upsert is idempotent and keyed by the entity's stable id, so a
/// reconciliation that fails partway can be replayed in full on the next
/// cycle without duplicating rows.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All feeds known to the system, in no particular order.
    async fn fetch_feeds(&self) -> Result<Vec<Feed>, StorageError>;

    /// Look up a feed by its subscription URL.
    async fn fetch_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StorageError>;

    /// Insert or replace a feed.
    async fn upsert_feed(&self, feed: &Feed) -> Result<(), StorageError>;

    /// Every stored item belonging to `feed`.
    async fn fetch_feed_items(&self, feed: &Feed) -> Result<Vec<FeedItem>, StorageError>;

    /// Insert or replace items in one batch. An empty slice is a no-op.
    async fn upsert_feed_items(&self, items: &[FeedItem]) -> Result<(), StorageError>;

    /// `user`'s unread news items for `feed`: the working set the
    /// reconciler matches new stories against.
    async fn fetch_unread_news_items(
        &self,
        feed: &Feed,
        user: &User,
    ) -> Result<Vec<NewsItem>, StorageError>;

    /// Load news items by id. Unknown ids are skipped, not an error.
    async fn fetch_news_items(&self, ids: &[String]) -> Result<Vec<NewsItem>, StorageError>;

    /// Insert or replace news items in one batch. An empty slice is a no-op.
    async fn upsert_news_items(&self, items: &[NewsItem]) -> Result<(), StorageError>;

    /// Users holding a subscription to `feed`.
    async fn fetch_users_subscribed_to(&self, feed: &Feed) -> Result<Vec<User>, StorageError>;

    /// Look up a user by email address.
    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    /// Insert or replace users (and their subscriptions) in one batch.
    async fn upsert_users(&self, users: &[User]) -> Result<(), StorageError>;
}
