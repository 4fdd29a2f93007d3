use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by repository implementations.
///
/// A storage failure during reconciliation aborts the refresh for that feed
/// only; the scheduler retries on the next cycle since every write is an
/// idempotent upsert keyed by a stable id.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON column (alternates, subscriptions) failed to serialize or parse
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entity referenced by id does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

// ============================================================================
// Constants
// ============================================================================

/// Age in hours under which a stored item still counts as a current story.
///
/// Surfacing layers use this to decide whether an item is worth showing at
/// all; reconciliation itself never consults it.
pub const RELEVANCE_WINDOW_HOURS: i64 = 18;

// ============================================================================
// Feeds
// ============================================================================

/// Syndication format a feed was detected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedSourceType {
    Rss,
    Rdf,
    Atom,
}

impl FeedSourceType {
    /// Stable identifier used in the database column.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSourceType::Rss => "rss",
            FeedSourceType::Rdf => "rdf",
            FeedSourceType::Atom => "atom",
        }
    }

    /// Parse the database representation. Unknown values fall back to RSS,
    /// the dominant format.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "rdf" => FeedSourceType::Rdf,
            "atom" => FeedSourceType::Atom,
            _ => FeedSourceType::Rss,
        }
    }
}

/// A subscribable source of stories.
///
/// Mutated on every successful refresh: `title` and `description` are
/// replaced with freshly fetched values, `last_fetched` is stamped, and
/// `number_of_items` grows by the count of genuinely new items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    /// Website the feed belongs to, as advertised by the feed document.
    pub link: Option<String>,
    pub source_type: FeedSourceType,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub image_title: Option<String>,
    pub image_link: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    /// Lifetime count of distinct items seen for this feed.
    pub number_of_items: i64,
    pub created_on: DateTime<Utc>,
}

// ============================================================================
// Feed Items
// ============================================================================

/// One raw story instance as fetched from a feed, deduplicated by `link`.
///
/// Created once per distinct link per feed and never deleted; `last_seen`
/// is the only field that changes after creation, stamped every time the
/// item reappears in a fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    /// Publication time from the document; absent entries use the fetch time
    /// as their effective timestamp.
    pub published: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
}

impl FeedItem {
    pub fn new(
        feed_id: &str,
        title: impl Into<String>,
        link: impl Into<String>,
        description: Option<String>,
        published: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            feed_id: feed_id.to_string(),
            title: title.into(),
            link: link.into(),
            description,
            published,
            last_seen: now,
            created_on: now,
        }
    }

    /// Whether the item was created within [`RELEVANCE_WINDOW_HOURS`] of `now`.
    pub fn is_still_relevant(&self, now: DateTime<Utc>) -> bool {
        self.created_on > now - Duration::hours(RELEVANCE_WINDOW_HOURS)
    }
}

// ============================================================================
// News Items
// ============================================================================

/// A duplicate story folded into an existing [`NewsItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternate {
    pub link: String,
    pub title: String,
    pub favicon: String,
}

/// A per-user, per-story surfaced item.
///
/// For a given feed and user there is at most one unread news item per
/// underlying story; duplicates arriving later become alternates on the
/// existing item rather than new rows. Never deleted; `is_read` flips on
/// explicit user action only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub feed_id: String,
    pub user_id: String,
    pub feed_item_id: String,
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    /// Denormalized from the owning feed at creation time.
    pub feed_title: String,
    pub favicon: String,
    pub published: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
    pub is_read: bool,
    pub alternates: Vec<Alternate>,
}

impl NewsItem {
    /// Append a duplicate story to this item.
    ///
    /// Links already present are skipped, so replaying a refresh cannot grow
    /// the list without bound.
    pub fn push_alternate(&mut self, link: &str, title: &str, favicon: &str) {
        if self.link == link || self.alternates.iter().any(|a| a.link == link) {
            return;
        }
        self.alternates.push(Alternate {
            link: link.to_string(),
            title: title.to_string(),
            favicon: favicon.to_string(),
        });
    }
}

// ============================================================================
// Users
// ============================================================================

/// An account that subscribes to feeds and accumulates unread counts.
///
/// `number_of_unread_items` is a maintained counter, not a query: the
/// fan-out step increments it after every refresh and mark-as-read
/// decrements it, floored at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email_address: String,
    pub number_of_unread_items: i64,
    /// Feed ids this user is subscribed to.
    pub subscriptions: Vec<String>,
    pub created_on: DateTime<Utc>,
}

impl User {
    pub fn new(email_address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email_address: email_address.into(),
            number_of_unread_items: 0,
            subscriptions: Vec::new(),
            created_on: now,
        }
    }

    pub fn is_subscribed_to(&self, feed_id: &str) -> bool {
        self.subscriptions.iter().any(|id| id == feed_id)
    }

    /// Add a subscription; adding the same feed twice is a no-op.
    pub fn subscribe(&mut self, feed_id: &str) {
        if !self.is_subscribed_to(feed_id) {
            self.subscriptions.push(feed_id.to_string());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
