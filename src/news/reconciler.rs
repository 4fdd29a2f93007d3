use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::feed::ParsedFeed;
use crate::storage::{Feed, FeedItem, NewsItem, Repository, StorageError, User};

use super::favicon::favicon_for_item;
use super::similarity::are_titles_similar;

/// Result of reconciling one feed's fetch against stored state.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The feed with refreshed metadata, as persisted.
    pub feed: Feed,
    /// News items created during this refresh, summed over all subscribers.
    /// Drives the unread fan-out.
    pub new_news_items: usize,
}

/// Build the per-user surfaced item for a freshly seen story.
pub fn news_item_from_feed_item(
    item: &FeedItem,
    feed: &Feed,
    user: &User,
    now: DateTime<Utc>,
) -> NewsItem {
    NewsItem {
        id: Uuid::new_v4().to_string(),
        feed_id: item.feed_id.clone(),
        user_id: user.id.clone(),
        feed_item_id: item.id.clone(),
        title: item.title.clone(),
        description: item.description.clone(),
        link: item.link.clone(),
        feed_title: feed.title.clone(),
        favicon: favicon_for_item(&item.link, feed),
        published: item.published.unwrap_or(now),
        created_on: now,
        is_read: false,
        alternates: Vec::new(),
    }
}

/// Reconciles fetched feed documents against stored state.
///
/// The repository is injected at construction; the reconciler holds no
/// other state and one instance serves any number of concurrent per-feed
/// refreshes.
pub struct Reconciler<R> {
    repository: Arc<R>,
}

impl<R: Repository> Reconciler<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Reconcile one feed's freshly fetched items.
    ///
    /// Computes and persists, in order: new feed items (one per distinct
    /// link, regardless of subscriber count), `last_seen` touches for
    /// re-fetched links, new news items, merged news items, and finally the
    /// feed's refreshed metadata, so a torn run never shows an updated
    /// `number_of_items` without its items.
    ///
    /// The duplicate-story decision runs per user: each subscriber's unread
    /// items form a private working set, grown as the batch is classified,
    /// so two similar stories arriving in one batch fold together too.
    pub async fn reconcile(
        &self,
        mut feed: Feed,
        refreshed: &ParsedFeed,
        fetched: Vec<FeedItem>,
    ) -> Result<RefreshOutcome, StorageError> {
        let now = Utc::now();
        let mut stored = self.repository.fetch_feed_items(&feed).await?;
        let subscribers = self.repository.fetch_users_subscribed_to(&feed).await?;

        // Link classification is feed-scoped and identical for every user:
        // a link already stored only gets its last_seen stamped.
        let mut new_items: Vec<FeedItem> = Vec::new();
        let mut touched: HashMap<String, FeedItem> = HashMap::new();
        for candidate in fetched {
            let mut seen = false;
            for existing in stored.iter_mut().filter(|i| i.link == candidate.link) {
                existing.last_seen = now;
                touched.insert(existing.id.clone(), existing.clone());
                seen = true;
            }
            if !seen {
                new_items.push(candidate.clone());
                // Later candidates with the same link match here instead of
                // creating a second item
                stored.push(candidate);
            }
        }

        let mut new_news: Vec<NewsItem> = Vec::new();
        let mut updated_news: HashMap<String, NewsItem> = HashMap::new();
        for user in &subscribers {
            let mut working = self
                .repository
                .fetch_unread_news_items(&feed, user)
                .await?;
            let mut created_ids: HashSet<String> = HashSet::new();
            let mut merged_ids: HashSet<String> = HashSet::new();

            for item in &new_items {
                let similar: Vec<usize> = working
                    .iter()
                    .enumerate()
                    .filter(|(_, news)| are_titles_similar(&news.title, &item.title))
                    .map(|(idx, _)| idx)
                    .collect();

                if similar.is_empty() {
                    let news = news_item_from_feed_item(item, &feed, user, now);
                    created_ids.insert(news.id.clone());
                    // Grows the working set so the rest of the batch can
                    // match against it
                    working.push(news);
                } else {
                    for idx in similar {
                        let news = &mut working[idx];
                        news.push_alternate(
                            &item.link,
                            &item.title,
                            &favicon_for_item(&item.link, &feed),
                        );
                        news.published = item.published.unwrap_or(now);
                        merged_ids.insert(news.id.clone());
                    }
                }
            }

            // The working set holds the final state of everything this user's
            // pass touched; split it into inserts and updates
            for news in working {
                if created_ids.contains(&news.id) {
                    new_news.push(news);
                } else if merged_ids.contains(&news.id) {
                    updated_news.insert(news.id.clone(), news);
                }
            }
        }

        // All item writes land before the feed metadata write
        self.repository.upsert_feed_items(&new_items).await?;
        let touched: Vec<FeedItem> = touched.into_values().collect();
        self.repository.upsert_feed_items(&touched).await?;
        self.repository.upsert_news_items(&new_news).await?;
        let updated_news: Vec<NewsItem> = updated_news.into_values().collect();
        self.repository.upsert_news_items(&updated_news).await?;

        feed.last_fetched = Some(now);
        feed.title = refreshed.title.clone();
        feed.description = refreshed.description.clone();
        feed.number_of_items += new_items.len() as i64;
        self.repository.upsert_feed(&feed).await?;

        tracing::info!(
            feed = %feed.url,
            new_items = new_items.len(),
            touched = touched.len(),
            new_news = new_news.len(),
            merged = updated_news.len(),
            "Feed reconciled"
        );

        Ok(RefreshOutcome {
            feed,
            new_news_items: new_news.len(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
