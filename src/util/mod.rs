//! Small text helpers shared by the parser and storage layers.

mod text;

pub use text::{sanitize_link, truncate_description, MAX_DESCRIPTION_CHARS};
