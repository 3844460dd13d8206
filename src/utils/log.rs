// src/utils/log.rs

//! Console presentation helpers with server-style formatting.
//!
//! Library code logs through the `log` facade; these helpers are for the
//! human-facing output of the CLI (headers, summaries, per-fetcher rows).

use chrono::Local;

use crate::models::{ExecutionStats, FetcherStats};

/// Format a line with timestamp and tag.
fn format_line(tag: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, tag, message)
}

/// Print a success message
pub fn success(message: &str) {
    println!("{}", format_line("INFO", &format!("✓ {}", message)));
}

/// Print a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    let msg = format!("[STEP {}/{}] {}", step_num, total, message);
    println!("{}", format_line("INFO", &msg));
}

/// Print a separator line
pub fn separator() {
    println!("{}", format_line("INFO", &"─".repeat(60)));
}

/// Print a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    println!("{}", format_line("INFO", &border));
    println!("{}", format_line("INFO", &format!("  {}", title)));
    println!("{}", format_line("INFO", &border));
}

/// Print a sub-item (indented)
pub fn sub_item(message: &str) {
    println!("{}", format_line("INFO", &format!("    {}", message)));
}

/// Print a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("{}", format_line("SUMMARY", title));
    for (key, value) in items {
        println!("{}", format_line("SUMMARY", &format!("    {}: {}", key, value)));
    }
}

/// One-line description of a fetcher run.
pub fn fetcher_line(stats: &FetcherStats) -> String {
    let outcome = if stats.succeeded {
        format!("ok, {} items", stats.items)
    } else {
        stats
            .error
            .clone()
            .unwrap_or_else(|| "not completed".to_string())
    };
    let mut line = format!(
        "{:<16} p{:<4} {:>2} attempt(s) {:>6} ms  {}",
        stats.name, stats.priority, stats.attempts, stats.duration_ms, outcome
    );
    if !stats.proxies.is_empty() {
        line.push_str(&format!("  via {}", stats.proxies.join(" → ")));
    }
    line
}

/// Print the execution statistics of a search.
pub fn execution_summary(stats: &ExecutionStats) {
    summary(
        "Search",
        &[
            (
                "Fetchers",
                format!(
                    "{}/{} succeeded",
                    stats.fetchers_succeeded, stats.fetchers_attempted
                ),
            ),
            ("Raw items", stats.total_raw_before_dedup.to_string()),
            ("Duplicates removed", stats.duplicates_removed.to_string()),
            ("Filtered out", stats.filtered_out.to_string()),
            ("Returned", stats.total_returned.to_string()),
            ("Duration", format!("{} ms", stats.duration_ms)),
            ("Deadline hit", stats.deadline_hit.to_string()),
            ("Cached", stats.cached.to_string()),
        ],
    );
    separator();
    for fetcher in &stats.fetchers {
        sub_item(&fetcher_line(fetcher));
    }
}
