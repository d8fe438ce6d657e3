//! Link extraction from fetched resources
//!
//! This module turns a fetched body into the set of absolute URLs it
//! references:
//! - Bodies are decoded from the byte-order mark, the `Content-Type` charset,
//!   an in-document declaration, or a detected encoding, in that order
//! - HTML documents are parsed leniently with `scraper`
//! - XML and feed bodies (RSS, Atom, sitemaps) are parsed as fragments, with
//!   `<link>` and `<loc>` elements (prefixed or not) scanned directly
//! - Every reference is resolved against the response URL and passed
//!   through the scheme/extension `LinkFilter`

use crate::url::LinkFilter;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use scraper::{Html, Selector};
use std::borrow::Cow;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Element/attribute pairs that carry resource references
const REFERENCE_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href"]),
    ("img", &["src", "srcset", "data-src", "data-srcset"]),
    ("script", &["src"]),
    ("link", &["href"]),
    ("video", &["src", "poster", "data-src"]),
    ("audio", &["src", "data-src"]),
    ("iframe", &["src", "data-src"]),
    ("source", &["src", "srcset", "data-src"]),
    ("embed", &["src", "data-src"]),
    ("track", &["src"]),
    ("object", &["data"]),
];

/// Extra pairs only meaningful in feeds
const FEED_ATTRIBUTES: &[(&str, &[&str])] = &[("enclosure", &["url"]), ("content", &["src"])];

/// Elements whose text content is a URL in RSS feeds and sitemaps
const FEED_TEXT_ELEMENTS: &[&str] = &["link", "loc"];

/// How many leading bytes are inspected when sniffing the body
const SNIFF_LEN: usize = 200;

/// How many leading bytes are inspected for NUL bytes
const BINARY_SNIFF_LEN: usize = 1024;

/// How many leading bytes are searched for a `<meta>` or XML charset declaration
const CHARSET_SNIFF_LEN: usize = 1024;

/// Errors that stop extraction for one resource
///
/// These are per-URL failures; the traversal logs them and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Body looks like binary data")]
    Binary,
}

/// Markup dialect chosen for a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Html,
    Xml,
}

/// Extracts every allowed absolute URL referenced by a fetched body
///
/// # Arguments
///
/// * `content` - The raw response body
/// * `content_type` - The `Content-Type` header, if the server sent one
/// * `base_url` - The final response URL used to resolve relative references
/// * `filter` - Scheme and extension rules applied to every resolved URL
///
/// # Returns
///
/// * `Ok(HashSet<String>)` - The referenced URLs (empty for non-markup bodies)
/// * `Err(ExtractError)` - The body could not be interpreted as text
///
/// # Example
///
/// ```
/// use linkharvest::crawler::extract_links;
/// use linkharvest::url::LinkFilter;
/// use url::Url;
///
/// let html = br#"<a href="/about">About</a><script src="/app.js"></script>"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// let links = extract_links(html, Some("text/html"), &base, &LinkFilter::default()).unwrap();
/// assert!(links.contains("https://example.com/about"));
/// assert_eq!(links.len(), 1);
/// ```
pub fn extract_links(
    content: &[u8],
    content_type: Option<&str>,
    base_url: &Url,
    filter: &LinkFilter,
) -> Result<HashSet<String>, ExtractError> {
    let content_type = content_type
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    if let Some(ct) = content_type.as_deref() {
        if !is_markup_content_type(ct) {
            return Ok(HashSet::new());
        }
    }

    if looks_binary(content) {
        return Err(ExtractError::Binary);
    }

    let text = decode_body(content, content_type.as_deref(), base_url);
    let markup = detect_markup(content_type.as_deref(), &text);

    let mut references: Vec<String> = Vec::new();
    match markup {
        Markup::Html => {
            let document = Html::parse_document(&text);
            collect_attribute_references(&document, REFERENCE_ATTRIBUTES, &mut references);
        }
        Markup::Xml => {
            let fragment = Html::parse_fragment(&text);
            collect_attribute_references(&fragment, REFERENCE_ATTRIBUTES, &mut references);
            collect_attribute_references(&fragment, FEED_ATTRIBUTES, &mut references);
            references.extend(scan_feed_elements(&text, FEED_TEXT_ELEMENTS));
        }
    }

    Ok(references
        .iter()
        .filter_map(|reference| resolve_link(reference, base_url, filter))
        .collect())
}

/// Picks the markup dialect from the content type, or by sniffing the body
pub fn detect_markup(content_type: Option<&str>, text: &str) -> Markup {
    if let Some(ct) = content_type.filter(|ct| !ct.is_empty()) {
        let ct = ct.to_ascii_lowercase();
        // xhtml is served as application/xhtml+xml
        return if ct.contains("xml") && !ct.contains("html") {
            Markup::Xml
        } else {
            Markup::Html
        };
    }

    let prefix: String = text
        .trim_start()
        .chars()
        .take(SNIFF_LEN)
        .collect::<String>()
        .to_lowercase();

    if prefix.starts_with("<?xml") || prefix.contains("<rss") || prefix.contains("<feed") {
        Markup::Xml
    } else {
        Markup::Html
    }
}

fn is_markup_content_type(content_type: &str) -> bool {
    content_type.starts_with("text/") || content_type.contains("xml") || content_type.contains("html")
}

fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// Decodes a body to text
///
/// A byte-order mark wins, then the `Content-Type` charset, then a
/// `<meta>`/XML declaration, then valid UTF-8, then the detector's guess.
/// Undecodable sequences become U+FFFD.
fn decode_body<'a>(content: &'a [u8], content_type: Option<&str>, base_url: &Url) -> Cow<'a, str> {
    let encoding = Encoding::for_bom(content)
        .map(|(encoding, _)| encoding)
        .or_else(|| content_type.and_then(header_charset))
        .or_else(|| declared_charset(content))
        .unwrap_or_else(|| detect_encoding(content, base_url));

    let (text, used, had_errors) = encoding.decode(content);
    if had_errors {
        tracing::debug!(
            "Body of {} has invalid {} sequences, replaced",
            base_url,
            used.name()
        );
    }
    text
}

/// The encoding named by a `charset=` parameter
fn header_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| {
            let label = value.trim().trim_matches(['"', '\'']);
            Encoding::for_label(label.as_bytes())
        })
}

/// The encoding declared inside the document head
///
/// Covers `<meta charset>`, `<meta http-equiv content="...; charset=...">`
/// and `<?xml encoding="..."?>`. A declared UTF-16 cannot be right for a
/// body that was readable as ASCII, so it maps to UTF-8.
fn declared_charset(content: &[u8]) -> Option<&'static Encoding> {
    let head = &content[..content.len().min(CHARSET_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    let label = ["charset=", "encoding="].iter().find_map(|key| {
        let start = head.find(key)? + key.len();
        let value = head[start..].trim_start_matches(['"', '\'', ' ']);
        let end = value
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(value.len());
        (end > 0).then(|| value[..end].to_string())
    })?;

    let encoding = Encoding::for_label(label.as_bytes())?;
    if encoding == UTF_16LE || encoding == UTF_16BE {
        Some(UTF_8)
    } else {
        Some(encoding)
    }
}

/// Guesses an encoding for an undeclared body
///
/// The host's top-level domain is a hint (for example `cn` favours GBK).
fn detect_encoding(content: &[u8], base_url: &Url) -> &'static Encoding {
    if std::str::from_utf8(content).is_ok() {
        return UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(content, true);
    let tld = base_url
        .host_str()
        .and_then(|host| host.rsplit('.').next())
        .filter(|label| label.bytes().all(|b| b.is_ascii_alphabetic()));
    detector.guess(tld.map(str::as_bytes), true)
}

fn collect_attribute_references(
    document: &Html,
    pairs: &[(&str, &[&str])],
    out: &mut Vec<String>,
) {
    for (element, attributes) in pairs {
        let Ok(selector) = Selector::parse(element) else {
            continue;
        };

        for node in document.select(&selector) {
            for attribute in *attributes {
                let Some(value) = node.value().attr(attribute) else {
                    continue;
                };

                if attribute.ends_with("srcset") {
                    out.extend(parse_srcset(value));
                } else {
                    out.push(value.to_string());
                }
            }
        }
    }
}

/// Splits a `srcset` list into its candidate URLs
///
/// Each comma-separated candidate is `url [descriptor]`; only the URL is kept.
fn parse_srcset(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Collects URLs from feed elements named in `names`, in raw markup
///
/// Tags match on their local name regardless of case, attributes or a
/// namespace prefix, so `<loc>`, `<LOC >` and `<image:loc>` all count. The
/// text of each element is taken (CDATA unwrapped), along with any `href`
/// attribute, which covers `<xhtml:link href="..."/>` in sitemaps.
fn scan_feed_elements(text: &str, names: &[&str]) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        let tag = &rest[start + 1..];
        let Some(tag_end) = tag.find('>') else {
            break;
        };
        let inner = &tag[..tag_end];
        let after_tag = &tag[tag_end + 1..];
        rest = after_tag;

        if inner.starts_with(|c: char| matches!(c, '/' | '!' | '?')) {
            continue;
        }

        let qualified = inner
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        let local = qualified.rsplit(':').next().unwrap_or(qualified);
        if !names.iter().any(|name| local.eq_ignore_ascii_case(name)) {
            continue;
        }

        if let Some(href) = attribute_value(inner, "href") {
            found.push(href.to_string());
        }

        if inner.ends_with('/') {
            continue;
        }

        // These elements hold text only, so the next closing tag is theirs
        let Some(end) = after_tag.find("</") else {
            break;
        };
        let value = after_tag[..end].trim();
        let value = value
            .strip_prefix("<![CDATA[")
            .and_then(|v| v.strip_suffix("]]>"))
            .unwrap_or(value)
            .trim();
        if !value.is_empty() {
            found.push(value.to_string());
        }
        rest = &after_tag[end..];
    }

    found
}

/// The quoted value of `name` inside a start tag's source
fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let mut from = 0;

    while let Some(pos) = lower[from..].find(name) {
        let at = from + pos;
        from = at + name.len();

        let preceded_by_space = lower[..at].ends_with(|c: char| c.is_whitespace());
        let after = lower[from..].trim_start();
        if !preceded_by_space || !after.starts_with('=') {
            continue;
        }

        let value_start = tag.len() - after.len() + 1;
        let value = tag[value_start..].trim_start();
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let value = &value[1..];
        return value.find(quote).map(|end| &value[..end]);
    }

    None
}

/// Resolves a raw reference to an absolute URL and applies the filter
///
/// Returns None if the reference is empty, fails to resolve, or is
/// rejected by the filter.
fn resolve_link(reference: &str, base_url: &Url, filter: &LinkFilter) -> Option<String> {
    let reference = reference.trim();

    if reference.is_empty() {
        return None;
    }

    let absolute_url = base_url.join(reference).ok()?;
    filter.allows(&absolute_url).then(|| absolute_url.to_string())
}
