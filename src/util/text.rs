use std::borrow::Cow;

/// Maximum number of characters stored for an item description.
///
/// Longer descriptions are cut at this boundary before they reach storage;
/// feeds routinely embed entire articles in the description element.
pub const MAX_DESCRIPTION_CHARS: usize = 1400;

/// Truncates a description to [`MAX_DESCRIPTION_CHARS`] characters.
///
/// Operates on characters, not bytes, so multi-byte content is never split
/// mid-codepoint.
///
/// # Returns
///
/// - `Cow::Borrowed` when the input already fits (no allocation)
/// - `Cow::Owned` with the first [`MAX_DESCRIPTION_CHARS`] characters otherwise
pub fn truncate_description(description: &str) -> Cow<'_, str> {
    match description.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        None => Cow::Borrowed(description),
        Some((byte_idx, _)) => Cow::Owned(description[..byte_idx].to_string()),
    }
}

/// Normalizes a link as fetched from a feed document.
///
/// Some publishers wrap link elements across lines; embedded newlines are
/// removed entirely and surrounding whitespace is trimmed.
pub fn sanitize_link(link: &str) -> String {
    link.replace('\n', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_description_borrowed() {
        let result = truncate_description("a short summary");
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, "a short summary");
    }

    #[test]
    fn test_description_at_limit_untouched() {
        let input = "a".repeat(MAX_DESCRIPTION_CHARS);
        let result = truncate_description(&input);
        assert_eq!(result.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_long_description_truncated() {
        let input = "b".repeat(MAX_DESCRIPTION_CHARS + 250);
        let result = truncate_description(&input);
        assert_eq!(result.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_truncation_is_char_aware() {
        // é is 2 bytes; byte-based slicing would panic on the boundary
        let input = "é".repeat(MAX_DESCRIPTION_CHARS + 10);
        let result = truncate_description(&input);
        assert_eq!(result.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_sanitize_link_strips_newlines_and_whitespace() {
        assert_eq!(
            sanitize_link("  https://example.com/a\n/b \n"),
            "https://example.com/a/b"
        );
        assert_eq!(
            sanitize_link("https://example.com/x"),
            "https://example.com/x"
        );
    }
}
