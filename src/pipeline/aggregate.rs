// src/pipeline/aggregate.rs

//! Result aggregation: merge, dedup, filter, truncate, and account.

use std::collections::HashSet;

use super::orchestrator::BatchOutcome;
use crate::models::{ExecutionStats, RawPosting, SearchRequest, SearchResult};
use crate::utils::tags::matches_experience;

/// Drop postings whose canonical URL or (title, company) key was already
/// seen. The first occurrence wins, so callers order the input by priority.
pub fn dedup_postings(postings: Vec<RawPosting>) -> Vec<RawPosting> {
    let mut urls = HashSet::new();
    let mut pairs = HashSet::new();
    let mut kept = Vec::with_capacity(postings.len());

    for posting in postings {
        let url_key = posting.url_key();
        let pair_key = posting.title_company_key();
        let url_seen = url_key.as_ref().is_some_and(|k| urls.contains(k));
        if url_seen || pairs.contains(&pair_key) {
            continue;
        }
        if let Some(key) = url_key {
            urls.insert(key);
        }
        pairs.insert(pair_key);
        kept.push(posting);
    }
    kept
}

/// Turn a finished batch into a [`SearchResult`].
///
/// Reports are visited in (priority, name) order, so a higher-priority
/// source wins every dedup tie.
pub fn aggregate(request: &SearchRequest, outcome: BatchOutcome) -> SearchResult {
    let BatchOutcome {
        mut reports,
        started_at,
        duration,
        deadline_hit,
    } = outcome;
    reports.sort_by(|a, b| {
        a.stats
            .priority
            .cmp(&b.stats.priority)
            .then_with(|| a.stats.name.cmp(&b.stats.name))
    });

    let fetchers_attempted = reports.iter().filter(|r| r.stats.attempted).count();
    let fetchers_succeeded = reports.iter().filter(|r| r.stats.succeeded).count();
    let mut fetchers = Vec::with_capacity(reports.len());
    let mut merged = Vec::new();
    for report in reports {
        merged.extend(report.postings);
        fetchers.push(report.stats);
    }

    let total_raw_before_dedup = merged.len();
    let unique = dedup_postings(merged);
    let duplicates_removed = total_raw_before_dedup - unique.len();

    let before_filter = unique.len();
    let mut jobs: Vec<RawPosting> = match request.experience_level.as_deref() {
        Some(level) => unique
            .into_iter()
            .filter(|p| matches_experience(p, level))
            .collect(),
        None => unique,
    };
    let filtered_out = before_filter - jobs.len();
    jobs.truncate(request.limit);

    log::info!(
        "Aggregated {} raw posting(s): {} duplicate(s), {} filtered, {} returned",
        total_raw_before_dedup,
        duplicates_removed,
        filtered_out,
        jobs.len()
    );

    SearchResult {
        stats: ExecutionStats {
            started_at,
            duration_ms: duration.as_millis() as u64,
            fetchers_attempted,
            fetchers_succeeded,
            total_raw_before_dedup,
            duplicates_removed,
            filtered_out,
            total_returned: jobs.len(),
            deadline_hit,
            cached: false,
            fetchers,
        },
        jobs,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::models::FetcherStats;
    use crate::pipeline::UnitReport;

    fn posting(title: &str, company: &str, source: &str, url: &str) -> RawPosting {
        RawPosting::new(title, company, source, url)
    }

    fn report(name: &str, priority: u32, postings: Vec<RawPosting>) -> UnitReport {
        let mut stats = FetcherStats::new(name, priority);
        stats.attempted = true;
        stats.succeeded = true;
        stats.items = postings.len();
        UnitReport {
            stats,
            postings,
            error: None,
        }
    }

    fn outcome(reports: Vec<UnitReport>) -> BatchOutcome {
        BatchOutcome {
            reports,
            started_at: Utc::now(),
            duration: Duration::from_millis(42),
            deadline_hit: false,
        }
    }

    #[test]
    fn dedup_uses_url_then_title_company() {
        let input = vec![
            posting("Rust Dev", "Acme", "a", "https://x.com/1"),
            posting("Other", "Acme", "b", "https://X.com/1/?utm_source=feed"),
            posting("rust  dev", "ACME", "b", "https://y.com/9"),
            posting("Go Dev", "Acme", "b", ""),
            posting("go dev", "acme", "c", ""),
        ];
        let kept = dedup_postings(input);
        let titles: Vec<_> = kept.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Rust Dev", "Go Dev"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            posting("A", "X", "a", "https://x.com/a"),
            posting("B", "X", "a", "https://x.com/a#frag"),
            posting("A", "x", "b", "https://z.com/a"),
            posting("C", "Y", "b", "https://x.com/c"),
        ];
        let once = dedup_postings(input);
        let twice = dedup_postings(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn higher_priority_source_wins_ties() {
        let shared = "https://board.example.com/jobs/1";
        let result = aggregate(
            &SearchRequest::new("rust", "", 10),
            outcome(vec![
                report("late", 50, vec![posting("Rust Dev", "Acme", "late", shared)]),
                report("early", 1, vec![posting("Rust Dev", "Acme", "early", shared)]),
            ]),
        );
        assert_eq!(result.jobs.len(), 1);
        assert_eq!(result.jobs[0].source, "early");
        assert_eq!(result.stats.fetchers[0].name, "early");
        assert_eq!(result.stats.duplicates_removed, 1);
    }

    #[test]
    fn experience_filter_then_limit() {
        let result = aggregate(
            &SearchRequest::new("rust", "", 1).with_experience_level("senior"),
            outcome(vec![report(
                "a",
                1,
                vec![
                    posting("Junior Rust Dev", "A", "a", "https://a.com/1"),
                    posting("Senior Rust Dev", "B", "a", "https://a.com/2"),
                    posting("Sr. Backend Engineer", "C", "a", "https://a.com/3"),
                ],
            )]),
        );
        assert_eq!(result.stats.filtered_out, 1);
        assert_eq!(result.jobs.len(), 1);
        assert_eq!(result.jobs[0].title, "Senior Rust Dev");
        assert_eq!(result.stats.total_returned, 1);
        assert_eq!(result.stats.duration_ms, 42);
    }
}
