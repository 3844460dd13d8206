//! Built-in fetcher plugins.
//!
//! This module contains the configuration-driven sources:
//! - HTML job boards scraped with CSS selectors (`HtmlBoardFetcher`)
//! - JSON search APIs mapped with JSON pointers (`JsonApiFetcher`)
//!
//! [`build_fetchers`] is the static registration table: every source in the
//! configuration becomes one fetcher, built once at process start.

mod html_board;
mod json_api;

use std::sync::Arc;

pub use html_board::HtmlBoardFetcher;
pub use json_api::JsonApiFetcher;

use crate::error::Result;
use crate::fetcher::{Fetcher, FetcherRegistry, FetcherStatus};
use crate::models::{Config, RawPosting, SourceKind};
use crate::utils::canonicalize_url;
use crate::utils::tags::{extract_tags, truncate_graphemes};

/// Longest description kept on a posting, in grapheme clusters.
const MAX_DESCRIPTION: usize = 500;

/// A fetcher ready to be registered.
pub struct Registration {
    pub fetcher: Arc<dyn Fetcher>,
    pub priority: u32,
    pub status: FetcherStatus,
}

/// Build one fetcher per configured source. Disabled sources are built too
/// and registered as `Disabled` so they show up in listings.
pub fn build_fetchers(config: &Config) -> Result<Vec<Registration>> {
    config
        .sources
        .iter()
        .map(|source| {
            let fetcher: Arc<dyn Fetcher> = match source.kind {
                SourceKind::Html => Arc::new(HtmlBoardFetcher::new(
                    source.clone(),
                    config.crawler.clone(),
                )?),
                SourceKind::Json => Arc::new(JsonApiFetcher::new(
                    source.clone(),
                    config.crawler.clone(),
                )?),
            };
            Ok(Registration {
                fetcher,
                priority: source.priority,
                status: if source.enabled {
                    FetcherStatus::Active
                } else {
                    FetcherStatus::Disabled
                },
            })
        })
        .collect()
}

/// Register every configured source. Returns how many were newly added.
pub fn register_all(registry: &FetcherRegistry, config: &Config) -> Result<usize> {
    let added = build_fetchers(config)?
        .into_iter()
        .filter(|r| registry.register_with_status(Arc::clone(&r.fetcher), r.priority, r.status))
        .count();
    Ok(added)
}

/// Case-insensitive substring match against the supported locations.
/// An empty list or an empty requested location matches.
pub(crate) fn location_supported(supported: &[String], location: &str) -> bool {
    let location = location.trim().to_lowercase();
    supported.is_empty()
        || location.is_empty()
        || supported
            .iter()
            .any(|l| location.contains(&l.trim().to_lowercase()))
}

/// Canonicalize the URL, cap the description and attach skill tags.
pub(crate) fn finish_posting(mut posting: RawPosting) -> RawPosting {
    if !posting.url.is_empty() {
        posting.url = canonicalize_url(&posting.url);
    }
    posting.description = truncate_graphemes(&posting.description, MAX_DESCRIPTION);
    posting.tags = extract_tags(&format!("{} {}", posting.title, posting.description));
    posting
}
