//! Depth-bounded link traversal
//!
//! The traversal walks an explicit work-list of `(url, remaining_depth)`
//! entries in pre-order depth-first order. A URL is tested against the
//! run's `visited` set and the caller's `exclude` set before it is ever
//! enqueued, so excluded or repeated URLs cost no network call.

use crate::crawler::download::DownloadArea;
use crate::crawler::fetcher::{fetch_url, FetchResult};
use crate::crawler::parser::extract_links;
use crate::storage::LinkType;
use crate::url::{extract_domain, LinkFilter};
use crate::HarvestError;
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of fetching one discovered URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A response was obtained and its body was stored
    Fetched {
        status_code: u16,
        content_type: Option<String>,
        artifact: PathBuf,
    },

    /// A response was obtained but storing its body failed
    DownloadFailed {
        status_code: u16,
        content_type: Option<String>,
        error: String,
    },

    /// No usable response: network failure or an HTTP error status
    NoResponse {
        status_code: Option<u16>,
        content_type: Option<String>,
        error: String,
    },
}

impl FetchOutcome {
    /// Valid iff a response was obtained and its body was persisted
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }

    pub fn link_type(&self) -> LinkType {
        if self.is_valid() {
            LinkType::Valid
        } else {
            LinkType::Invalid
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Fetched { status_code, .. } | Self::DownloadFailed { status_code, .. } => {
                Some(*status_code)
            }
            Self::NoResponse { status_code, .. } => *status_code,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Fetched { content_type, .. }
            | Self::DownloadFailed { content_type, .. }
            | Self::NoResponse { content_type, .. } => content_type.as_deref(),
        }
    }
}

/// One URL touched by a traversal
#[derive(Debug, Clone)]
pub struct TraversalEntry {
    pub url: String,
    pub outcome: FetchOutcome,
}

/// Parameters of one traversal run
#[derive(Debug, Clone)]
pub struct TraversalRequest<'a> {
    /// Where the walk starts; this page is fetched for its links only
    pub start_url: &'a Url,
    /// Depth budget; 0 means nothing is fetched
    pub max_depth: u32,
    /// URLs that must be neither fetched nor returned
    pub exclude: &'a HashSet<String>,
    /// Stop discovering once this many entries are recorded
    pub limit: usize,
}

/// Fetches pages, extracts their links and stores artifacts for one crawl
pub struct Traverser {
    client: Client,
    filter: LinkFilter,
    download_root: PathBuf,
}

impl Traverser {
    /// Creates a traverser
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client carrying the user agent and request timeout
    /// * `filter` - Scheme and extension rules for extracted links
    /// * `download_root` - Directory under which per-crawl areas are created
    pub fn new(client: Client, filter: LinkFilter, download_root: PathBuf) -> Self {
        Self {
            client,
            filter,
            download_root,
        }
    }

    /// Walks the link graph below `start_url`
    ///
    /// The start page is fetched to discover its links; every discovered URL
    /// is then fetched exactly once to classify it and store its body, and
    /// its own links are followed while its remaining depth is above zero.
    /// Per-URL failures are recorded in the returned entries and never
    /// abort the walk. `token` is checked before every fetch; a cancelled
    /// walk returns what it has gathered so far.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<TraversalEntry>)` - Every URL touched, in visit order
    /// * `Err(HarvestError::Io)` - The per-crawl download directory could not be created
    pub async fn traverse(
        &self,
        request: TraversalRequest<'_>,
        token: &CancellationToken,
    ) -> Result<Vec<TraversalEntry>, HarvestError> {
        let mut results = Vec::new();

        if request.max_depth == 0 || request.limit == 0 || token.is_cancelled() {
            return Ok(results);
        }

        let start_url = request.start_url;
        let (start_final_url, start_content_type, start_body) =
            match fetch_url(&self.client, start_url).await {
                FetchResult::Success {
                    final_url,
                    content_type,
                    body,
                    ..
                } => (final_url, content_type, body),
                FetchResult::HttpError { status_code, .. } => {
                    warn!("Start page {} returned HTTP {}", start_url, status_code);
                    return Ok(results);
                }
                FetchResult::NetworkError { error } => {
                    warn!("Start page {} unreachable: {}", start_url, error);
                    return Ok(results);
                }
            };

        let domain = extract_domain(start_url).unwrap_or_else(|| start_url.to_string());
        let area = DownloadArea::create(&self.download_root, &domain).await?;
        debug!("Storing artifacts under {}", area.path().display());

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start_url.to_string());
        if start_final_url != *start_url {
            visited.insert(start_final_url.to_string());
        }

        let mut stack: Vec<(Url, u32)> = Vec::new();
        self.push_children(
            &mut stack,
            &mut visited,
            request.exclude,
            self.links_of(&start_body, start_content_type.as_deref(), &start_final_url),
            request.max_depth - 1,
        );

        while let Some((url, remaining)) = stack.pop() {
            if results.len() >= request.limit {
                info!(
                    "Reached link limit of {} for {}, stopping traversal",
                    request.limit, start_url
                );
                break;
            }
            if token.is_cancelled() {
                info!("Traversal of {} stopped by cancellation", start_url);
                break;
            }

            let outcome = match fetch_url(&self.client, &url).await {
                FetchResult::Success {
                    final_url,
                    status_code,
                    content_type,
                    body,
                } => {
                    if remaining > 0 {
                        let links = self.links_of(&body, content_type.as_deref(), &final_url);
                        self.push_children(
                            &mut stack,
                            &mut visited,
                            request.exclude,
                            links,
                            remaining - 1,
                        );
                    }

                    match area.store(url.as_str(), &body).await {
                        Ok(artifact) => FetchOutcome::Fetched {
                            status_code,
                            content_type,
                            artifact,
                        },
                        Err(e) => {
                            warn!("Failed to store body of {}: {}", url, e);
                            FetchOutcome::DownloadFailed {
                                status_code,
                                content_type,
                                error: e.to_string(),
                            }
                        }
                    }
                }
                FetchResult::HttpError {
                    status_code,
                    content_type,
                } => FetchOutcome::NoResponse {
                    status_code: Some(status_code),
                    content_type,
                    error: format!("HTTP {}", status_code),
                },
                FetchResult::NetworkError { error } => {
                    debug!("No response from {}: {}", url, error);
                    FetchOutcome::NoResponse {
                        status_code: None,
                        content_type: None,
                        error,
                    }
                }
            };

            results.push(TraversalEntry {
                url: url.to_string(),
                outcome,
            });
        }

        Ok(results)
    }

    fn links_of(&self, body: &[u8], content_type: Option<&str>, base_url: &Url) -> Vec<Url> {
        match extract_links(body, content_type, base_url, &self.filter) {
            Ok(links) => links
                .into_iter()
                .filter_map(|link| Url::parse(&link).ok())
                .collect(),
            Err(e) => {
                debug!("Skipping link extraction for {}: {}", base_url, e);
                Vec::new()
            }
        }
    }

    /// Marks unseen, non-excluded links visited and schedules them
    ///
    /// Children are pushed in reverse so the first extracted link is popped first.
    fn push_children(
        &self,
        stack: &mut Vec<(Url, u32)>,
        visited: &mut HashSet<String>,
        exclude: &HashSet<String>,
        links: Vec<Url>,
        remaining: u32,
    ) {
        let fresh: Vec<Url> = links
            .into_iter()
            .filter(|link| {
                let key = link.as_str();
                !exclude.contains(key) && visited.insert(key.to_string())
            })
            .collect();

        stack.extend(fresh.into_iter().rev().map(|link| (link, remaining)));
    }
}
