use std::sync::Arc;

use crate::storage::{Repository, StorageError, User};

use super::reconciler::RefreshOutcome;

/// Maintains per-user unread counters from refresh results.
pub struct UnreadCounts<R> {
    repository: Arc<R>,
}

impl<R: Repository> UnreadCounts<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Fan out a refresh cycle's results to every subscriber's counter.
    ///
    /// Outcomes with zero new news items leave user state untouched; each
    /// feed's subscribers are persisted in one batch write. Failed refreshes
    /// never reach this point; the scheduler drops them before fan-out.
    pub async fn apply_refresh_outcomes(
        &self,
        outcomes: &[RefreshOutcome],
    ) -> Result<(), StorageError> {
        for outcome in outcomes.iter().filter(|o| o.new_news_items > 0) {
            let mut subscribers = self
                .repository
                .fetch_users_subscribed_to(&outcome.feed)
                .await?;
            for user in &mut subscribers {
                user.number_of_unread_items += outcome.new_news_items as i64;
            }
            self.repository.upsert_users(&subscribers).await?;

            tracing::debug!(
                feed = %outcome.feed.url,
                new_news = outcome.new_news_items,
                subscribers = subscribers.len(),
                "Unread counters incremented"
            );
        }
        Ok(())
    }

    /// Mark news items read for `user` and settle their unread counter.
    ///
    /// The counter drops by the number of ids requested, floored at zero, so
    /// duplicate or concurrent mark-read calls can never drive it negative.
    /// Items belonging to other users are left alone.
    pub async fn mark_news_items_read(
        &self,
        user: &mut User,
        news_item_ids: &[String],
    ) -> Result<(), StorageError> {
        let mut items = self.repository.fetch_news_items(news_item_ids).await?;
        items.retain(|item| item.user_id == user.id && !item.is_read);
        for item in &mut items {
            item.is_read = true;
        }
        self.repository.upsert_news_items(&items).await?;

        user.number_of_unread_items =
            (user.number_of_unread_items - news_item_ids.len() as i64).max(0);
        self.repository
            .upsert_users(std::slice::from_ref(user))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Feed, FeedSourceType, MemoryRepository, NewsItem};
    use chrono::Utc;
    use uuid::Uuid;

    fn test_feed(url: &str) -> Feed {
        Feed {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            title: "Feed".to_string(),
            description: None,
            link: None,
            source_type: FeedSourceType::Rss,
            category: None,
            image_url: None,
            image_title: None,
            image_link: None,
            last_fetched: None,
            number_of_items: 0,
            created_on: Utc::now(),
        }
    }

    fn unread_item(feed: &Feed, user: &User) -> NewsItem {
        NewsItem {
            id: Uuid::new_v4().to_string(),
            feed_id: feed.id.clone(),
            user_id: user.id.clone(),
            feed_item_id: Uuid::new_v4().to_string(),
            title: "Headline".to_string(),
            description: None,
            link: "https://example.com/a".to_string(),
            feed_title: feed.title.clone(),
            favicon: "https://example.com/favicon.ico".to_string(),
            published: Utc::now(),
            created_on: Utc::now(),
            is_read: false,
            alternates: Vec::new(),
        }
    }

    fn outcome(feed: &Feed, new_news_items: usize) -> RefreshOutcome {
        RefreshOutcome {
            feed: feed.clone(),
            new_news_items,
        }
    }

    #[tokio::test]
    async fn test_fanout_increments_every_subscriber() {
        let repo = Arc::new(MemoryRepository::new());
        let feed = test_feed("https://a.example.com/rss");
        repo.upsert_feed(&feed).await.unwrap();

        let now = Utc::now();
        let mut alice = User::new("alice@example.com", now);
        alice.subscribe(&feed.id);
        let mut bob = User::new("bob@example.com", now);
        bob.subscribe(&feed.id);
        repo.upsert_users(&[alice, bob]).await.unwrap();

        let counts = UnreadCounts::new(repo.clone());
        counts
            .apply_refresh_outcomes(&[outcome(&feed, 3)])
            .await
            .unwrap();

        for email in ["alice@example.com", "bob@example.com"] {
            let user = repo.fetch_user_by_email(email).await.unwrap().unwrap();
            assert_eq!(user.number_of_unread_items, 3);
        }
    }

    #[tokio::test]
    async fn test_fanout_skips_zero_outcomes_and_other_feeds() {
        let repo = Arc::new(MemoryRepository::new());
        let feed_a = test_feed("https://a.example.com/rss");
        let feed_b = test_feed("https://b.example.com/rss");
        repo.upsert_feed(&feed_a).await.unwrap();
        repo.upsert_feed(&feed_b).await.unwrap();

        let now = Utc::now();
        let mut alice = User::new("alice@example.com", now);
        alice.subscribe(&feed_a.id);
        let mut bob = User::new("bob@example.com", now);
        bob.subscribe(&feed_b.id);
        repo.upsert_users(&[alice, bob]).await.unwrap();

        let counts = UnreadCounts::new(repo.clone());
        counts
            .apply_refresh_outcomes(&[outcome(&feed_a, 0), outcome(&feed_b, 2)])
            .await
            .unwrap();

        let alice = repo
            .fetch_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.number_of_unread_items, 0);
        let bob = repo
            .fetch_user_by_email("bob@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.number_of_unread_items, 2);
    }

    #[tokio::test]
    async fn test_mark_read_flips_flags_and_decrements() {
        let repo = Arc::new(MemoryRepository::new());
        let feed = test_feed("https://a.example.com/rss");
        repo.upsert_feed(&feed).await.unwrap();

        let mut user = User::new("alice@example.com", Utc::now());
        user.subscribe(&feed.id);
        user.number_of_unread_items = 2;
        repo.upsert_users(std::slice::from_ref(&user)).await.unwrap();

        let items = vec![unread_item(&feed, &user), unread_item(&feed, &user)];
        repo.upsert_news_items(&items).await.unwrap();
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

        let counts = UnreadCounts::new(repo.clone());
        counts.mark_news_items_read(&mut user, &ids).await.unwrap();

        assert_eq!(user.number_of_unread_items, 0);
        let stored = repo.fetch_news_items(&ids).await.unwrap();
        assert!(stored.iter().all(|i| i.is_read));
        assert!(repo
            .fetch_unread_news_items(&feed, &user)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_floors_counter_at_zero() {
        let repo = Arc::new(MemoryRepository::new());
        let feed = test_feed("https://a.example.com/rss");
        repo.upsert_feed(&feed).await.unwrap();

        let mut user = User::new("alice@example.com", Utc::now());
        user.number_of_unread_items = 2;
        repo.upsert_users(std::slice::from_ref(&user)).await.unwrap();

        // Five ids against a counter of two, most of them unknown
        let ids: Vec<String> = (0..5).map(|i| format!("missing-{}", i)).collect();
        let counts = UnreadCounts::new(repo.clone());
        counts.mark_news_items_read(&mut user, &ids).await.unwrap();

        assert_eq!(user.number_of_unread_items, 0);
        let stored = repo
            .fetch_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.number_of_unread_items, 0);
    }

    #[tokio::test]
    async fn test_mark_read_ignores_other_users_items() {
        let repo = Arc::new(MemoryRepository::new());
        let feed = test_feed("https://a.example.com/rss");
        repo.upsert_feed(&feed).await.unwrap();

        let now = Utc::now();
        let mut alice = User::new("alice@example.com", now);
        alice.subscribe(&feed.id);
        let mut bob = User::new("bob@example.com", now);
        bob.subscribe(&feed.id);
        repo.upsert_users(&[alice.clone(), bob.clone()])
            .await
            .unwrap();

        let bobs_item = unread_item(&feed, &bob);
        repo.upsert_news_items(std::slice::from_ref(&bobs_item))
            .await
            .unwrap();

        let counts = UnreadCounts::new(repo.clone());
        counts
            .mark_news_items_read(&mut alice, &[bobs_item.id.clone()])
            .await
            .unwrap();

        let stored = repo.fetch_news_items(&[bobs_item.id]).await.unwrap();
        assert!(!stored[0].is_read, "another user's item stays unread");
    }
}
