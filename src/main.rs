//! Sumi-Crawl main entry point
//!
//! This is the command-line interface for the Sumi-Crawl web crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_crawl::config::{load_config_with_hash, validate, Config};
use sumi_crawl::output::{generate_markdown_summary, print_summary};
use sumi_crawl::WebCrawler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Crawl: a polite, concurrent web crawler
///
/// Crawls from a set of seed URLs while respecting robots.txt, per-domain
/// delays and a global request budget, and stores every page it visits.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawl")]
#[command(version)]
#[command(about = "A polite, concurrent web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URLs, appended to the seeds of the configuration
    #[arg(value_name = "SEED")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Override the maximum number of pages
    #[arg(long)]
    max_pages: Option<u64>,

    /// Override the maximum link depth
    #[arg(long)]
    max_depth: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawl=info,warn"),
            1 => EnvFilter::new("sumi_crawl=debug,info"),
            2 => EnvFilter::new("sumi_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Folds CLI seeds and limits into the configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    config.seeds.extend(cli.seeds.iter().cloned());

    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(max_depth) = cli.max_depth {
        config.crawler.max_depth = max_depth;
    }
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Sumi-Crawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Max pages: {}", crawler.max_pages);
    println!("  Workers: {}", crawler.num_workers);
    println!("  Requests per second: {}", crawler.requests_per_second);
    println!("  Per-domain delay: {}ms", crawler.per_domain_delay_ms);
    println!(
        "  Retries: {} (base delay {}ms)",
        crawler.max_retries, crawler.retry_base_delay_ms
    );
    println!("  Same domain only: {}", crawler.same_domain_only);
    println!("  Respect robots.txt: {}", crawler.respect_robots);
    println!("  Dynamic fetching: {}", crawler.enable_dynamic);
    println!("  Shared frontier: {}", crawler.use_shared_frontier);

    if !crawler.allowed_domains.is_empty() {
        println!("\nAllowed Domains ({}):", crawler.allowed_domains.len());
        for domain in &crawler.allowed_domains {
            println!("  - {}", domain);
        }
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Backend: {:?}", config.output.backend);
    println!("  Path: {}", config.output.path);
    if let Some(summary_path) = &config.output.summary_path {
        println!("  Summary: {}", summary_path);
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let summary_path = config.output.summary_path.clone();
    let seeds = config.seeds.clone();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            ctrl_c.cancel();
        }
    });

    let mut crawler = WebCrawler::new(config)?;
    let summary = crawler
        .crawl_with_cancellation(&seeds, cancel)
        .await
        .context("crawl aborted")?;

    if let Some(path) = summary_path {
        generate_markdown_summary(&summary, Path::new(&path))
            .with_context(|| format!("failed to write summary to {}", path))?;
        tracing::info!("Summary written to {}", path);
    }

    print_summary(&summary);
    Ok(())
}
