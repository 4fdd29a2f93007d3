use chrono::{DateTime, Utc};
use feed_rs::model::FeedType;
use feed_rs::parser;
use uuid::Uuid;

use crate::storage::{Feed, FeedItem, FeedSourceType};
use crate::util::{sanitize_link, truncate_description};

/// Feed-level metadata extracted from a fetched document.
///
/// Carries everything needed to bootstrap a new [`Feed`] or refresh the
/// mutable details (title, description) of an existing one.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub source_type: FeedSourceType,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub image_title: Option<String>,
    pub image_link: Option<String>,
}

impl ParsedFeed {
    /// Bootstrap a brand-new feed record from this document.
    pub fn into_feed(self, url: &str, now: DateTime<Utc>) -> Feed {
        Feed {
            id: Uuid::new_v4().to_string(),
            url: url.trim_end_matches('/').to_string(),
            title: self.title,
            description: self.description,
            link: self.link,
            source_type: self.source_type,
            category: self.category,
            image_url: self.image_url,
            image_title: self.image_title,
            image_link: self.image_link,
            last_fetched: None,
            number_of_items: 0,
            created_on: now,
        }
    }
}

/// A parsed feed document: channel metadata plus its items.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub feed: ParsedFeed,
    pub items: Vec<FeedItem>,
}

/// Parse a fetched document into feed metadata and items for `feed`.
///
/// Handles RSS 0.9x/2.0, RSS 1.0 (RDF), and Atom via feed-rs. Items carry
/// sanitized links and descriptions truncated to the storage limit;
/// entries without any link are dropped (the link is the dedup key, an
/// item without one cannot be tracked), with a warning.
pub fn parse_document(feed: &Feed, bytes: &[u8]) -> Result<ParsedDocument, parser::ParseFeedError> {
    let parsed = parser::parse(bytes)?;
    let now = Utc::now();

    let source_type = match parsed.feed_type {
        FeedType::Atom => FeedSourceType::Atom,
        FeedType::RSS1 => FeedSourceType::Rdf,
        _ => FeedSourceType::Rss,
    };

    let image = parsed.logo.or(parsed.icon);
    let meta = ParsedFeed {
        title: parsed
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| feed.title.clone()),
        description: parsed
            .description
            .map(|d| truncate_description(&d.content).into_owned()),
        link: parsed.links.first().map(|l| l.href.clone()),
        source_type,
        category: parsed.categories.first().map(|c| c.term.clone()),
        image_url: image.as_ref().map(|i| i.uri.clone()),
        image_title: image.as_ref().and_then(|i| i.title.clone()),
        image_link: image.and_then(|i| i.link.map(|l| l.href)),
    };

    let mut items = Vec::with_capacity(parsed.entries.len());
    let mut skipped = 0usize;
    for entry in parsed.entries {
        let Some(link) = entry.links.first().map(|l| sanitize_link(&l.href)) else {
            skipped += 1;
            continue;
        };
        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());
        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|d| truncate_description(&d).into_owned());
        let published = entry.published.or(entry.updated);

        items.push(FeedItem::new(
            &feed.id,
            title,
            link,
            description,
            published,
            now,
        ));
    }

    if skipped > 0 {
        tracing::warn!(
            feed = %feed.url,
            skipped = skipped,
            "Entries without links dropped"
        );
    }

    Ok(ParsedDocument { feed: meta, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>City News</title>
    <description>News from the city</description>
    <link>https://news.example.com</link>
    <item>
        <title>Council approves budget</title>
        <link>https://news.example.com/budget</link>
        <description>The council approved next year's budget.</description>
        <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>No link here</title>
    </item>
</channel></rss>"#;

    const RDF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
    <channel rdf:about="https://rdf.example.com/rss">
        <title>RDF Channel</title>
        <link>https://rdf.example.com</link>
        <description>Stories over RDF</description>
        <items><rdf:Seq><rdf:li resource="https://rdf.example.com/1"/></rdf:Seq></items>
    </channel>
    <item rdf:about="https://rdf.example.com/1">
        <title>First RDF story</title>
        <link>https://rdf.example.com/1</link>
        <description>Body</description>
        <dc:date>2025-01-06T10:00:00Z</dc:date>
    </item>
</rdf:RDF>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Channel</title>
    <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
    <updated>2025-01-06T10:00:00Z</updated>
    <entry>
        <title>Atom story</title>
        <id>urn:entry:1</id>
        <link href="https://atom.example.com/1"/>
        <updated>2025-01-06T10:00:00Z</updated>
        <summary>Summary text</summary>
    </entry>
</feed>"#;

    fn target_feed() -> Feed {
        let parsed = ParsedFeed {
            title: "City News".to_string(),
            description: None,
            link: None,
            source_type: FeedSourceType::Rss,
            category: None,
            image_url: None,
            image_title: None,
            image_link: None,
        };
        parsed.into_feed("https://news.example.com/rss", Utc::now())
    }

    #[test]
    fn test_parse_rss_document() {
        let feed = target_feed();
        let doc = parse_document(&feed, RSS.as_bytes()).unwrap();

        assert_eq!(doc.feed.title, "City News");
        assert_eq!(doc.feed.source_type, FeedSourceType::Rss);
        assert_eq!(doc.feed.description.as_deref(), Some("News from the city"));

        // The linkless entry is dropped
        assert_eq!(doc.items.len(), 1);
        let item = &doc.items[0];
        assert_eq!(item.title, "Council approves budget");
        assert_eq!(item.link, "https://news.example.com/budget");
        assert_eq!(item.feed_id, feed.id);
        assert!(item.published.is_some());
    }

    #[test]
    fn test_parse_rdf_document_maps_source_type() {
        let feed = target_feed();
        let doc = parse_document(&feed, RDF.as_bytes()).unwrap();
        assert_eq!(doc.feed.source_type, FeedSourceType::Rdf);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "First RDF story");
    }

    #[test]
    fn test_parse_atom_document_maps_source_type() {
        let feed = target_feed();
        let doc = parse_document(&feed, ATOM.as_bytes()).unwrap();
        assert_eq!(doc.feed.source_type, FeedSourceType::Atom);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].link, "https://atom.example.com/1");
        assert_eq!(doc.items[0].description.as_deref(), Some("Summary text"));
    }

    #[test]
    fn test_parse_invalid_document_errors() {
        let feed = target_feed();
        assert!(parse_document(&feed, b"<not a feed").is_err());
    }

    #[test]
    fn test_long_descriptions_truncated() {
        let feed = target_feed();
        let body = "x".repeat(4000);
        let doc = format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>
<item><title>Long</title><link>https://news.example.com/long</link>
<description>{}</description></item></channel></rss>"#,
            body
        );
        let parsed = parse_document(&feed, doc.as_bytes()).unwrap();
        let description = parsed.items[0].description.as_ref().unwrap();
        assert_eq!(description.chars().count(), crate::util::MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_into_feed_strips_trailing_slash() {
        let parsed = ParsedFeed {
            title: "T".to_string(),
            description: None,
            link: None,
            source_type: FeedSourceType::Rss,
            category: None,
            image_url: None,
            image_title: None,
            image_link: None,
        };
        let feed = parsed.into_feed("https://example.com/rss/", Utc::now());
        assert_eq!(feed.url, "https://example.com/rss");
    }
}
