//! Storage layer: domain model, the repository contract, and its two
//! implementations (sqlx/SQLite and in-memory).

mod memory;
mod repository;
mod schema;
mod sqlite;
mod types;

pub use memory::MemoryRepository;
pub use repository::Repository;
pub use schema::Database;
pub use types::{
    Alternate, Feed, FeedItem, FeedSourceType, NewsItem, StorageError, User,
    RELEVANCE_WINDOW_HOURS,
};
