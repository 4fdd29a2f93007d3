//! Feed fetch adapter: HTTP retrieval and format-specific parsing.
//!
//! Everything downstream of this module works with a format-neutral
//! [`ParsedDocument`]; RSS/RDF/Atom quirks stop here.

mod fetcher;
mod parser;

pub use fetcher::{fetch_feed, FetchError};
pub use parser::{parse_document, ParsedDocument, ParsedFeed};
