//! jobcrawl CLI
//!
//! Runs searches against the configured sources and inspects the fetcher
//! registry and proxy pool.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jobcrawl::{
    config,
    error::Result,
    models::{Config, SearchRequest},
    pipeline::Engine,
    utils::log as console,
};

/// jobcrawl - Concurrent Job Posting Crawler
#[derive(Parser, Debug)]
#[command(
    name = "jobcrawl",
    version,
    about = "Concurrent job-posting crawler with proxy rotation"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search every eligible source
    Search {
        #[arg(short, long)]
        keyword: String,

        #[arg(short, long, default_value = "")]
        location: String,

        #[arg(short = 'n', long, default_value_t = 25)]
        limit: usize,

        /// Restrict to these sources (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Experience level filter (internship, entry, mid, senior, lead)
        #[arg(short, long)]
        experience_level: Option<String>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered sources
    Sources,

    /// List proxy identities
    Proxies {
        /// Run one health-check pass first
        #[arg(long)]
        check: bool,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Validation is strict; other commands fall back to defaults.
    let config: Config = if matches!(cli.command, Command::Validate) {
        log::info!("Validating {}...", cli.config.display());
        config::load_all(&cli.config)?
    } else {
        config::load_config(&cli.config)
    };
    let engine = Engine::from_config(Arc::new(config)).await?;

    match cli.command {
        Command::Search {
            keyword,
            location,
            limit,
            sources,
            experience_level,
            json,
        } => {
            let mut request = SearchRequest::new(keyword, location, limit);
            if !sources.is_empty() {
                request = request.with_sources(sources);
            }
            if let Some(level) = experience_level {
                request = request.with_experience_level(level);
            }

            let response = engine.service().search(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if response.success {
                console::header(&format!("{} job(s)", response.total_jobs));
                for job in &response.jobs {
                    console::sub_item(&job.format("{title} @ {company} [{location}] {url}"));
                }
                if let Some(stats) = &response.execution_stats {
                    console::execution_summary(stats);
                }
            } else {
                log::error!(
                    "Search failed: {}",
                    response.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Command::Sources => {
            console::header("Sources");
            for d in engine.registry().descriptors() {
                console::sub_item(&format!(
                    "{:<16} {:<18} p{:<4} {:<12} ok {} / err {} / items {}",
                    d.name,
                    d.capability.to_string(),
                    d.priority,
                    d.status.to_string(),
                    d.successes,
                    d.errors,
                    d.items_produced
                ));
            }
        }

        Command::Proxies { check } => {
            let total = if check { 2 } else { 1 };
            if check {
                console::step(1, total, "Probing proxy identities");
                let report = engine.health_checker().run_once().await;
                console::summary(
                    "Health check",
                    &[
                        ("Probed", report.probed.to_string()),
                        ("Passed", report.passed.to_string()),
                        ("Retired", report.retired.to_string()),
                        ("Reinstated", report.reinstated.to_string()),
                    ],
                );
            }
            console::step(total, total, "Listing proxy identities");
            console::header(&format!(
                "{} proxies ({} active)",
                engine.pool().len(),
                engine.pool().active_count()
            ));
            for p in engine.pool().snapshot() {
                console::sub_item(&format!(
                    "{:<28} {:<10} {:<4} q={:.2} {} ok/{} fail {}",
                    p.id(),
                    p.group,
                    p.region.as_deref().unwrap_or("-"),
                    p.quality,
                    p.successes,
                    p.failures,
                    if p.active { "active" } else { "retired" }
                ));
            }
        }

        Command::Validate => {
            console::success(&format!(
                "Config OK ({} source(s), {} proxy identities)",
                engine.registry().len(),
                engine.pool().len()
            ));
        }
    }

    engine.shutdown().await;
    Ok(())
}
