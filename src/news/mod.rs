//! The aggregation core: title similarity, favicon resolution, feed
//! reconciliation, and unread-count fan-out.
//!
//! Reconciliation compares a freshly fetched batch against stored state and
//! produces the minimal set of mutations: new feed items, `last_seen`
//! touches, new per-user news items, and duplicate stories folded into
//! existing news items as alternates. Fan-out then propagates new-item
//! counts to every subscriber's unread counter.

mod favicon;
mod reconciler;
mod similarity;
mod unread;

pub use favicon::favicon_for_item;
pub use reconciler::{news_item_from_feed_item, Reconciler, RefreshOutcome};
pub use similarity::are_titles_similar;
pub use unread::UnreadCounts;
