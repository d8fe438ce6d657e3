/// Maximum length of an artifact filename, in characters
pub const MAX_FILENAME_CHARS: usize = 200;

/// Characters that are illegal in filenames on common filesystems
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Derives an artifact filename from a URL
///
/// Illegal filesystem characters and control characters are stripped and the
/// result is capped at [`MAX_FILENAME_CHARS`] characters.
///
/// # Examples
///
/// ```
/// use linkharvest::url::sanitize_filename;
///
/// assert_eq!(sanitize_filename("https://example.com/a?b=1"), "httpsexample.comab=1");
/// ```
pub fn sanitize_filename(url: &str) -> String {
    let cleaned: String = url
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();

    // "." and ".." cannot name a regular file
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_illegal_characters() {
        assert_eq!(
            sanitize_filename("https://example.com/path/to/page"),
            "httpsexample.compathtopage"
        );
        assert_eq!(sanitize_filename("a<b>c:d\"e|f*g"), "abcdefg");
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(sanitize_filename("a\u{0}b\tc\nd"), "abcd");
    }

    #[test]
    fn test_caps_length() {
        let long = format!("https://example.com/{}", "x".repeat(500));
        let name = sanitize_filename(&long);
        assert_eq!(name.chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_caps_length_on_char_boundary() {
        let long = "é".repeat(300);
        let name = sanitize_filename(&long);
        assert_eq!(name.chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_degenerate_names() {
        assert_eq!(sanitize_filename("//"), "_");
        assert_eq!(sanitize_filename(".."), "_");
    }
}
