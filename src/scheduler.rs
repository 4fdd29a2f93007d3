use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::interval;

use crate::config::Config;
use crate::feed::fetch_feed;
use crate::news::{Reconciler, RefreshOutcome, UnreadCounts};
use crate::storage::{Feed, Repository};

/// Drives periodic refreshes across every known feed.
///
/// Feeds are independent: each one's fetch-reconcile sequence runs inside
/// its own future with a bounded concurrency pool, and any failure
/// (network, parse, or storage) is logged and contained to that feed.
/// Unread counters are fanned out once per cycle, from successful outcomes
/// only.
pub struct Scheduler<R> {
    repository: Arc<R>,
    client: reqwest::Client,
    reconciler: Reconciler<R>,
    unread: UnreadCounts<R>,
    config: Config,
}

impl<R: Repository> Scheduler<R> {
    pub fn new(repository: Arc<R>, client: reqwest::Client, config: Config) -> Self {
        Self {
            reconciler: Reconciler::new(repository.clone()),
            unread: UnreadCounts::new(repository.clone()),
            repository,
            client,
            config,
        }
    }

    /// Run refresh cycles forever at the configured interval.
    pub async fn run(&self) -> Result<(), crate::storage::StorageError> {
        tracing::info!(
            interval_minutes = self.config.refresh_interval_minutes,
            "Refresh scheduler started"
        );

        let mut timer = interval(self.config.refresh_interval());
        loop {
            timer.tick().await;
            self.refresh_cycle().await?;
        }
    }

    /// Refresh every feed once and fan out unread counts.
    ///
    /// Only a storage failure during fan-out propagates; per-feed failures
    /// have already been absorbed by then.
    pub async fn refresh_cycle(&self) -> Result<Vec<RefreshOutcome>, crate::storage::StorageError> {
        let feeds = self.repository.fetch_feeds().await?;
        if feeds.is_empty() {
            tracing::debug!("No feeds to refresh");
            return Ok(Vec::new());
        }

        let total = feeds.len();
        let outcomes: Vec<RefreshOutcome> = stream::iter(feeds)
            .map(|feed| self.refresh_one(feed))
            .buffer_unordered(self.config.max_concurrent_fetches)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;

        let new_news: usize = outcomes.iter().map(|o| o.new_news_items).sum();
        tracing::info!(
            feeds = total,
            refreshed = outcomes.len(),
            failed = total - outcomes.len(),
            new_news = new_news,
            "Refresh cycle complete"
        );

        self.unread.apply_refresh_outcomes(&outcomes).await?;
        Ok(outcomes)
    }

    /// Fetch, parse, and reconcile a single feed.
    ///
    /// Returns `None` on any failure; storage is untouched when the fetch
    /// or parse fails, and a storage failure mid-reconcile is retried in
    /// full on the next cycle.
    async fn refresh_one(&self, feed: Feed) -> Option<RefreshOutcome> {
        let document = match fetch_feed(&self.client, &feed, self.config.fetch_timeout()).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(feed = %feed.url, error = %e, "Feed refresh failed");
                return None;
            }
        };

        match self
            .reconciler
            .reconcile(feed, &document.feed, document.items)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation failed, will retry next cycle");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
