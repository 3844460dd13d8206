// src/services/html_board.rs

//! HTML job board fetcher.
//!
//! Fetches a search results page built from a URL template and extracts
//! postings using configured CSS selectors.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{finish_posting, location_supported};
use crate::error::{AppError, FetchError, Result};
use crate::fetcher::{Capability, Fetcher};
use crate::models::{CrawlerConfig, HtmlSelectors, RawPosting, SourceConfig};
use crate::proxy::ProxyIdentity;
use crate::utils::block::classify_response;
use crate::utils::http::{HttpClients, fetch_text};
use crate::utils::tags::normalize_whitespace;
use crate::utils::{fill_template, resolve_url};

/// Selectors compiled once at construction.
#[derive(Debug)]
struct CompiledSelectors {
    row: Selector,
    title: Selector,
    company: Option<Selector>,
    location: Option<Selector>,
    salary: Option<Selector>,
    link: Option<Selector>,
    description: Option<Selector>,
    link_attr: String,
}

impl CompiledSelectors {
    fn compile(selectors: &HtmlSelectors) -> Result<Self> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(Self {
            row: parse_selector(&selectors.row)?,
            title: parse_selector(&selectors.title)?,
            company: optional(&selectors.company)?,
            location: optional(&selectors.location)?,
            salary: optional(&selectors.salary)?,
            link: optional(&selectors.link)?,
            description: optional(&selectors.description)?,
            link_attr: selectors.link_attr.clone(),
        })
    }
}

/// Fetcher for a server-rendered job board.
pub struct HtmlBoardFetcher {
    source: SourceConfig,
    clients: HttpClients,
    selectors: CompiledSelectors,
}

impl HtmlBoardFetcher {
    /// Create a fetcher; fails if a selector does not parse or the HTTP
    /// client cannot be built.
    pub fn new(source: SourceConfig, crawler: CrawlerConfig) -> Result<Self> {
        let selectors = CompiledSelectors::compile(&source.selectors)?;
        Ok(Self {
            source,
            clients: HttpClients::new(crawler)?,
            selectors,
        })
    }

    /// Extract postings from a results page.
    pub fn parse_postings(&self, html: &str, base_url: &Url) -> Vec<RawPosting> {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.row)
            .filter_map(|row| self.parse_row(&row, base_url))
            .collect()
    }

    fn parse_row(&self, row: &ElementRef, base_url: &Url) -> Option<RawPosting> {
        let sel = &self.selectors;
        let title_elem = row.select(&sel.title).next()?;
        let title = element_text(&title_elem);
        if title.is_empty() {
            return None;
        }

        let text_of = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|s| row.select(s).next())
                .map(|el| element_text(&el))
                .unwrap_or_default()
        };

        let link_elem = sel
            .link
            .as_ref()
            .and_then(|s| row.select(s).next())
            .unwrap_or(title_elem);
        let raw_link = link_elem.value().attr(&sel.link_attr).unwrap_or("");
        let link = if raw_link.trim().is_empty() {
            String::new()
        } else {
            resolve_url(base_url, raw_link.trim())
        };

        let salary = text_of(&sel.salary);
        let mut posting = RawPosting::new(title, text_of(&sel.company), &self.source.name, link)
            .with_location(text_of(&sel.location))
            .with_description(text_of(&sel.description));
        if !salary.is_empty() {
            posting.salary = Some(salary);
        }
        Some(finish_posting(posting))
    }
}

#[async_trait]
impl Fetcher for HtmlBoardFetcher {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn capability(&self) -> Capability {
        Capability::PageFetch
    }

    fn supports_location(&self, location: &str) -> bool {
        location_supported(&self.source.locations, location)
    }

    fn needs_proxy(&self) -> bool {
        self.source.use_proxy
    }

    async fn fetch(
        &self,
        keyword: &str,
        location: &str,
        limit: usize,
        proxy: Option<&ProxyIdentity>,
    ) -> std::result::Result<Vec<RawPosting>, FetchError> {
        let url = fill_template(&self.source.url, keyword, location, limit);
        let base_url = Url::parse(&url)
            .map_err(|e| FetchError::unavailable(format!("bad url {url}: {e}")))?;
        let client = self
            .clients
            .client_for(proxy)
            .map_err(|e| FetchError::unavailable(e.to_string()))?;

        let (status, body) =
            fetch_text(&client, &url, proxy.is_some(), self.clients.max_body_bytes()).await?;
        if let Some(err) = classify_response(status, &body) {
            return Err(err);
        }

        let mut postings = self.parse_postings(&body, &base_url);
        log::debug!("{}: {} rows parsed from {}", self.source.name, postings.len(), url);
        postings.truncate(limit);
        Ok(postings)
    }
}

fn element_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
