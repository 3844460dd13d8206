// src/utils/block.rs

//! Soft-block detection.
//!
//! Job boards rarely answer a scraper with a clean error. They hand out 403s,
//! 429s, CAPTCHA interstitials or "unusual traffic" banners with a 200. This
//! module turns such responses into a [`FetchError`] so the orchestrator can
//! rotate the egress identity. Plugins with source-specific signatures can
//! pass extra markers through [`classify_response_with`].

use std::sync::OnceLock;

use regex::Regex;

use crate::error::FetchError;

/// Body fragments that indicate an anti-bot interstitial. A page that merely
/// embeds a CAPTCHA widget (apply or newsletter forms) does not match.
const BLOCK_MARKERS: &[&str] = &[
    r"<title>[^<]*(?:captcha|attention required|just a moment|are you a robot)[^<]*</title>",
    r"(?:solve|complete) (?:the|this) captcha",
    r"unusual traffic",
    r"are you a (?:human|robot)",
    r"verify you are human",
    r"access (?:to this page )?(?:has been )?denied",
    r"cf-chl-",
    r"challenge-platform",
    r"automated (?:queries|requests)",
    r"request blocked",
];

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!("(?i)(?:{})", BLOCK_MARKERS.join("|"));
        Regex::new(&pattern).expect("block markers are valid regex")
    })
}

/// Classify an HTTP response. Returns `None` when the response looks usable.
pub fn classify_response(status: u16, body: &str) -> Option<FetchError> {
    classify_response_with(status, body, &[])
}

/// Like [`classify_response`] with additional case-insensitive body markers.
pub fn classify_response_with(status: u16, body: &str, extra: &[&str]) -> Option<FetchError> {
    match status {
        429 => return Some(FetchError::rate_limited("HTTP 429")),
        401 | 403 => return Some(FetchError::blocked(format!("HTTP {status}"))),
        _ => {}
    }

    if let Some(found) = block_regex().find(body) {
        return Some(FetchError::blocked(format!(
            "block marker '{}' (HTTP {status})",
            found.as_str()
        )));
    }

    let lowered = body.to_lowercase();
    if let Some(marker) = extra
        .iter()
        .find(|m| !m.is_empty() && lowered.contains(&m.to_lowercase()))
    {
        return Some(FetchError::blocked(format!(
            "block marker '{marker}' (HTTP {status})"
        )));
    }

    if status >= 500 {
        return Some(FetchError::unavailable(format!("HTTP {status}")));
    }
    if !(200..300).contains(&status) {
        return Some(FetchError::unavailable(format!("unexpected HTTP {status}")));
    }
    None
}
