// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Query parameters that only track referrals and never identify a posting.
const TRACKING_PARAMS: &[&str] = &["ref", "source", "src", "trk", "trackingid", "fbclid", "gclid"];

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the lowercased host from a URL string.
///
/// # Examples
/// ```
/// use jobcrawl::utils::get_domain;
///
/// assert_eq!(
///     get_domain("https://Jobs.Example.com/path"),
///     Some("jobs.example.com".to_string())
/// );
/// ```
pub fn get_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}

/// Reduce a posting URL to its canonical form.
///
/// Lowercases scheme and host, drops the fragment and tracking parameters,
/// and strips trailing slashes. Unparseable input is only trimmed.
/// Applying it twice yields the same string.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let out = url.to_string();
    if url.query().is_none() {
        out.trim_end_matches('/').to_string()
    } else {
        out
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Fill `{keyword}`, `{location}` and `{limit}` placeholders, URL-encoding values.
pub fn fill_template(template: &str, keyword: &str, location: &str, limit: usize) -> String {
    template
        .replace("{keyword}", &encode(keyword))
        .replace("{location}", &encode(location))
        .replace("{limit}", &limit.to_string())
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.trim().as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://sub.example.com:8080/path"),
            Some("sub.example.com".to_string())
        );
        assert_eq!(get_domain("invalid-url"), None);
    }

    #[test]
    fn canonicalize_strips_noise() {
        assert_eq!(
            canonicalize_url("HTTPS://Example.com/jobs/42/?utm_source=x&ref=home#top"),
            "https://example.com/jobs/42"
        );
    }

    #[test]
    fn canonicalize_keeps_identifying_query() {
        assert_eq!(
            canonicalize_url("https://example.com/view?id=7&utm_medium=mail"),
            "https://example.com/view?id=7"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_url("https://example.com/a/b/?utm_campaign=z");
        assert_eq!(canonicalize_url(&once), once);
    }

    #[test]
    fn canonicalize_root_url() {
        assert_eq!(canonicalize_url("https://example.com/"), "https://example.com");
    }

    #[test]
    fn fill_template_encodes_values() {
        assert_eq!(
            fill_template(
                "https://x.io/s?q={keyword}&l={location}&n={limit}",
                "python developer",
                "New York",
                10
            ),
            "https://x.io/s?q=python+developer&l=New+York&n=10"
        );
    }
}
