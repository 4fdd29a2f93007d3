use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;

use crate::storage::Feed;

use super::parser::{parse_document, ParsedDocument};

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and parsing one feed.
///
/// All of them are recovered at the per-feed boundary: the refresh for that
/// feed becomes a logged no-op and every other feed proceeds untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Document could not be parsed as RSS, RDF, or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Fetch and parse one feed document.
///
/// Retries 429 and 5xx responses with exponential backoff (2s, 4s, 8s);
/// 4xx responses fail immediately. The body is streamed against a hard
/// size cap so a misbehaving server cannot exhaust memory.
pub async fn fetch_feed(
    client: &reqwest::Client,
    feed: &Feed,
    timeout: Duration,
) -> Result<ParsedDocument, FetchError> {
    let mut retry_count = 0;

    let bytes = loop {
        let response = tokio::time::timeout(timeout, client.get(&feed.url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::RateLimited(MAX_RETRIES));
            }
            let delay_secs = 2u64.pow(retry_count);
            tracing::warn!(
                feed = %feed.url,
                retry = retry_count,
                delay_secs = delay_secs,
                "Rate limited, backing off"
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        if response.status().is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }
            let delay_secs = 2u64.pow(retry_count);
            tracing::warn!(
                feed = %feed.url,
                status = %response.status(),
                retry = retry_count,
                delay_secs = delay_secs,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => break bytes,
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }
                let delay_secs = 2u64.pow(retry_count);
                tracing::debug!(
                    feed = %feed.url,
                    expected = expected,
                    received = received,
                    delay_secs = delay_secs,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    };

    parse_document(feed, &bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: trust Content-Length before pulling any bytes
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // A network interruption mid-body surfaces as fewer bytes than promised;
    // callers retry with backoff
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FeedSourceType;
    use chrono::Utc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><title>Story</title><link>https://example.com/story</link></item>
</channel></rss>"#;

    fn feed_at(url: &str) -> Feed {
        Feed {
            id: "feed-1".to_string(),
            url: url.to_string(),
            title: "Test".to_string(),
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

    fn timeout() -> Duration {
        Duration::from_secs(30)
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let feed = feed_at(&format!("{}/feed", mock_server.uri()));
        let client = reqwest::Client::new();

        let doc = fetch_feed(&client, &feed, timeout()).await.unwrap();
        assert_eq!(doc.feed.title, "Test");
        assert_eq!(doc.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_404_fails_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = feed_at(&format!("{}/feed", mock_server.uri()));
        let client = reqwest::Client::new();

        match fetch_feed(&client, &feed, timeout()).await.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        let feed = feed_at(&format!("{}/feed", mock_server.uri()));
        let client = reqwest::Client::new();

        match fetch_feed(&client, &feed, timeout()).await.unwrap_err() {
            FetchError::HttpStatus(500) => {}
            e => panic!("Expected HttpStatus(500), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        use wiremock::matchers::any;

        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let feed = feed_at(&format!("{}/feed", mock_server.uri()));
        let client = reqwest::Client::new();

        let doc = fetch_feed(&client, &feed, timeout()).await.unwrap();
        assert_eq!(doc.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_malformed_document_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let feed = feed_at(&format!("{}/feed", mock_server.uri()));
        let client = reqwest::Client::new();

        match fetch_feed(&client, &feed, timeout()).await.unwrap_err() {
            FetchError::Parse(_) => {}
            e => panic!("Expected Parse error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_FEED_SIZE + 1]))
            .mount(&mock_server)
            .await;

        let feed = feed_at(&format!("{}/feed", mock_server.uri()));
        let client = reqwest::Client::new();

        match fetch_feed(&client, &feed, timeout()).await.unwrap_err() {
            FetchError::ResponseTooLarge => {}
            e => panic!("Expected ResponseTooLarge, got {:?}", e),
        }
    }
}
