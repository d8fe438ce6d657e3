use url::Url;

/// Extracts the domain from a URL
///
/// The domain keeps an explicit port, so `http://127.0.0.1:8080/` maps to
/// `127.0.0.1:8080`; two crawl targets on one host but different ports are
/// different websites.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use linkharvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://localhost:8080/").unwrap();
/// assert_eq!(extract_domain(&url), Some("localhost:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
