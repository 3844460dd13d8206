//! Job posting data structure.

use serde::{Deserialize, Serialize};

use crate::utils::canonicalize_url;

/// A posting as emitted by a fetcher.
///
/// Postings are never mutated after a fetcher returns them; the aggregator
/// only reorders, drops and truncates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawPosting {
    /// Job title
    pub title: String,

    /// Hiring company
    pub company: String,

    /// Location as printed by the source
    #[serde(default)]
    pub location: String,

    /// Free-form salary text
    #[serde(default)]
    pub salary: Option<String>,

    /// Plain-text description or snippet
    #[serde(default)]
    pub description: String,

    /// Name of the fetcher that produced the posting
    pub source: String,

    /// Canonical URL of the posting
    pub url: String,

    /// Extracted skill tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawPosting {
    /// Create a posting with the required fields, leaving the rest empty.
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        source: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            location: String::new(),
            salary: None,
            description: String::new(),
            source: source.into(),
            url: url.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Primary dedup key. `None` when the posting carries no usable URL.
    pub fn url_key(&self) -> Option<String> {
        let url = self.url.trim();
        if url.is_empty() {
            return None;
        }
        Some(canonicalize_url(url))
    }

    /// Fallback dedup key: lowercased, whitespace-normalized title and company.
    pub fn title_company_key(&self) -> (String, String) {
        (normalize_key(&self.title), normalize_key(&self.company))
    }

    /// Format posting for display using a template.
    ///
    /// Supported placeholders: `{title}`, `{company}`, `{location}`,
    /// `{salary}`, `{source}`, `{url}`.
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{title}", &self.title)
            .replace("{company}", &self.company)
            .replace("{location}", &self.location)
            .replace("{salary}", self.salary.as_deref().unwrap_or("-"))
            .replace("{source}", &self.source)
            .replace("{url}", &self.url)
    }
}

fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
