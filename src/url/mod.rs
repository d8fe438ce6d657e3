//! URL handling module for Linkharvest
//!
//! This module provides domain extraction, the scheme/extension link filter,
//! artifact filename sanitization and validation of website URLs.

mod domain;
mod filename;
mod filter;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::extract_domain;
pub use filename::{sanitize_filename, MAX_FILENAME_CHARS};
pub use filter::LinkFilter;

/// Validates a website URL before it is recorded as a crawl target
///
/// The URL must parse, use `http` or `https`, and carry a host.
///
/// # Returns
///
/// * `Ok((Url, String))` - The parsed URL and its domain
/// * `Err(UrlError)` - The URL cannot be crawled
///
/// # Examples
///
/// ```
/// use linkharvest::url::validate_website_url;
///
/// let (url, domain) = validate_website_url("https://example.com/start").unwrap();
/// assert_eq!(url.path(), "/start");
/// assert_eq!(domain, "example.com");
///
/// assert!(validate_website_url("ftp://example.com/").is_err());
/// ```
pub fn validate_website_url(url_str: &str) -> Result<(Url, String), UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let domain = extract_domain(&url).ok_or(UrlError::MissingDomain)?;
    Ok((url, domain))
}
