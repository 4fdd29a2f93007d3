use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::repository::Repository;
use super::types::{Feed, FeedItem, NewsItem, StorageError, User};

/// In-memory [`Repository`] backed by per-entity maps.
///
/// This is the deliberate test double for the storage contract: test setup
/// constructs one and hands it to the code under test, instead of any
/// environment-triggered substitution. It is also usable as an ephemeral
/// backend for one-shot runs where nothing needs to survive the process.
#[derive(Default)]
pub struct MemoryRepository {
    feeds: Mutex<HashMap<String, Feed>>,
    feed_items: Mutex<HashMap<String, FeedItem>>,
    news_items: Mutex<HashMap<String, NewsItem>>,
    users: Mutex<HashMap<String, User>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored feed items, across all feeds.
    pub fn feed_item_count(&self) -> usize {
        self.feed_items.lock().unwrap().len()
    }

    /// Total number of stored news items, across all users.
    pub fn news_item_count(&self) -> usize {
        self.news_items.lock().unwrap().len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn fetch_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        Ok(self.feeds.lock().unwrap().values().cloned().collect())
    }

    async fn fetch_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StorageError> {
        Ok(self
            .feeds
            .lock()
            .unwrap()
            .values()
            .find(|f| f.url == url)
            .cloned())
    }

    async fn upsert_feed(&self, feed: &Feed) -> Result<(), StorageError> {
        self.feeds
            .lock()
            .unwrap()
            .insert(feed.id.clone(), feed.clone());
        Ok(())
    }

    async fn fetch_feed_items(&self, feed: &Feed) -> Result<Vec<FeedItem>, StorageError> {
        Ok(self
            .feed_items
            .lock()
            .unwrap()
            .values()
            .filter(|item| item.feed_id == feed.id)
            .cloned()
            .collect())
    }

    async fn upsert_feed_items(&self, items: &[FeedItem]) -> Result<(), StorageError> {
        let mut store = self.feed_items.lock().unwrap();
        for item in items {
            store.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    async fn fetch_unread_news_items(
        &self,
        feed: &Feed,
        user: &User,
    ) -> Result<Vec<NewsItem>, StorageError> {
        Ok(self
            .news_items
            .lock()
            .unwrap()
            .values()
            .filter(|n| !n.is_read && n.feed_id == feed.id && n.user_id == user.id)
            .cloned()
            .collect())
    }

    async fn fetch_news_items(&self, ids: &[String]) -> Result<Vec<NewsItem>, StorageError> {
        let store = self.news_items.lock().unwrap();
        Ok(ids.iter().filter_map(|id| store.get(id).cloned()).collect())
    }

    async fn upsert_news_items(&self, items: &[NewsItem]) -> Result<(), StorageError> {
        let mut store = self.news_items.lock().unwrap();
        for item in items {
            store.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    async fn fetch_users_subscribed_to(&self, feed: &Feed) -> Result<Vec<User>, StorageError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.is_subscribed_to(&feed.id))
            .cloned()
            .collect())
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email_address == email)
            .cloned())
    }

    async fn upsert_users(&self, users: &[User]) -> Result<(), StorageError> {
        let mut store = self.users.lock().unwrap();
        for user in users {
            store.insert(user.id.clone(), user.clone());
        }
        Ok(())
    }
}
