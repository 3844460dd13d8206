// src/services/json_api.rs

//! JSON API fetcher.
//!
//! Calls a search endpoint and maps an array of objects onto postings with
//! JSON pointers (RFC 6901).

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{finish_posting, location_supported};
use crate::error::{FetchError, Result};
use crate::fetcher::{Capability, Fetcher};
use crate::models::{CrawlerConfig, JsonFields, RawPosting, SourceConfig};
use crate::proxy::ProxyIdentity;
use crate::utils::block::classify_response;
use crate::utils::http::{HttpClients, fetch_text};
use crate::utils::tags::normalize_whitespace;
use crate::utils::{fill_template, resolve_url};

/// Fetcher for a JSON search API.
pub struct JsonApiFetcher {
    source: SourceConfig,
    clients: HttpClients,
}

impl JsonApiFetcher {
    pub fn new(source: SourceConfig, crawler: CrawlerConfig) -> Result<Self> {
        Ok(Self {
            source,
            clients: HttpClients::new(crawler)?,
        })
    }

    /// Map a response document onto postings.
    ///
    /// A body that is not JSON, or whose `items` pointer does not resolve to
    /// an array, is a parse failure. Items without a title are skipped.
    pub fn parse_postings(
        &self,
        body: &str,
        base_url: &Url,
    ) -> std::result::Result<Vec<RawPosting>, FetchError> {
        let document: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::parse(format!("{}: invalid JSON: {e}", self.source.name)))?;

        let fields = &self.source.fields;
        let items = if fields.items.is_empty() {
            Some(&document)
        } else {
            document.pointer(&fields.items)
        };
        let items = items.and_then(Value::as_array).ok_or_else(|| {
            FetchError::parse(format!(
                "{}: no array at '{}'",
                self.source.name, fields.items
            ))
        })?;

        Ok(items
            .iter()
            .filter_map(|item| self.parse_item(item, fields, base_url))
            .collect())
    }

    fn parse_item(&self, item: &Value, fields: &JsonFields, base_url: &Url) -> Option<RawPosting> {
        let title = text_at(item, &fields.title);
        if title.is_empty() {
            return None;
        }
        let raw_url = text_at(item, &fields.url);
        let url = if raw_url.is_empty() {
            raw_url
        } else {
            resolve_url(base_url, &raw_url)
        };

        let mut posting = RawPosting::new(title, text_at(item, &fields.company), &self.source.name, url)
            .with_location(text_at(item, &fields.location));
        if let Some(pointer) = &fields.description {
            posting.description = text_at(item, pointer);
        }
        if let Some(pointer) = &fields.salary {
            let salary = text_at(item, pointer);
            if !salary.is_empty() {
                posting.salary = Some(salary);
            }
        }
        Some(finish_posting(posting))
    }
}

#[async_trait]
impl Fetcher for JsonApiFetcher {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn capability(&self) -> Capability {
        Capability::ApiFetch
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

        let mut postings = self.parse_postings(&body, &base_url)?;
        postings.truncate(limit);
        Ok(postings)
    }
}

/// String form of the value at `pointer`; numbers are stringified, anything
/// else missing or structured yields an empty string.
fn text_at(item: &Value, pointer: &str) -> String {
    match item.pointer(pointer) {
        Some(Value::String(s)) => normalize_whitespace(s),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
