use url::Url;

/// Schemes a discovered link may use
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Decides which resolved URLs are reported as links
///
/// A link passes when its scheme is `http` or `https` and its path does not
/// end with one of the excluded extensions (compared case-insensitively).
#[derive(Debug, Clone)]
pub struct LinkFilter {
    excluded_extensions: Vec<String>,
}

impl LinkFilter {
    pub fn new<I, S>(excluded_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded_extensions: excluded_extensions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Returns true if the URL should be kept
    pub fn allows(&self, url: &Url) -> bool {
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return false;
        }

        let path = url.path().to_lowercase();
        !self
            .excluded_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self::new([".js", ".css"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allows(url: &str) -> bool {
        LinkFilter::default().allows(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_allows_http_and_https() {
        assert!(allows("http://example.com/page"));
        assert!(allows("https://example.com/page"));
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(!allows("ftp://example.com/file"));
        assert!(!allows("mailto:someone@example.com"));
        assert!(!allows("data:text/plain,hello"));
    }

    #[test]
    fn test_rejects_excluded_extensions() {
        assert!(!allows("https://example.com/static/app.js"));
        assert!(!allows("https://example.com/static/site.CSS"));
        assert!(!allows("https://example.com/static/app.js?v=3"));
    }

    #[test]
    fn test_extension_only_matches_path_suffix() {
        assert!(allows("https://example.com/docs/javascript-guide"));
        assert!(allows("https://example.com/app.js/readme"));
        assert!(allows("https://example.com/page?file=app.js"));
    }

    #[test]
    fn test_custom_extensions() {
        let filter = LinkFilter::new([".pdf"]);
        assert!(!filter.allows(&Url::parse("https://example.com/a.pdf").unwrap()));
        assert!(filter.allows(&Url::parse("https://example.com/a.js").unwrap()));
    }
}
