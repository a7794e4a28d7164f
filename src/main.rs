//! Shelf-Scout main entry point
//!
//! Command-line interface: runs one crawl job over the configured shop
//! domains and writes the discovered product URLs.

use anyhow::{bail, Context};
use clap::Parser;
use shelf_scout::config::{load_config_with_hash, validate, validate_domain_roots, Config, OutputFormat};
use shelf_scout::output::{format_progress, print_summary};
use shelf_scout::{CrawlService, JobRequest, JobStatus};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shelf-Scout: product page discovery for e-commerce sites
///
/// Crawls each shop from its root URL, politely and within a page budget,
/// and reports the URLs that look like product detail pages.
#[derive(Parser, Debug)]
#[command(name = "shelf-scout")]
#[command(version)]
#[command(about = "Discovers product page URLs on e-commerce sites", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Shop root URL to crawl; replaces the configured domains (repeatable)
    #[arg(short, long = "domain", value_name = "URL")]
    domains: Vec<String>,

    /// Page cap per domain
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Result file format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Directory receiving result files
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Seconds between progress lines
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    progress_interval: u64,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    let roots: Vec<String> = config.domains.iter().map(|d| d.url.clone()).collect();
    if roots.is_empty() {
        bail!("no domains to crawl: pass --domain or list [[domains]] in the config");
    }

    if cli.dry_run {
        return handle_dry_run(&config, &roots);
    }

    handle_crawl(config, config_hash, roots, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_scout=info,warn"),
            1 => EnvFilter::new("shelf_scout=debug,info"),
            2 => EnvFilter::new("shelf_scout=trace,debug"),
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

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if !cli.domains.is_empty() {
        config.domains = cli
            .domains
            .iter()
            .map(|url| shelf_scout::config::DomainEntry { url: url.clone() })
            .collect();
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages_per_domain = max_pages;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.to_string_lossy().to_string();
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, roots: &[String]) -> anyhow::Result<()> {
    let parsed = validate_domain_roots(roots)?;

    println!("=== Shelf-Scout Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.worker_count);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages per domain: {}", config.crawler.max_pages_per_domain);
    println!("  Politeness interval: {}ms", config.crawler.politeness_interval);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    println!("  Follow pagination: {}", config.crawler.follow_pagination);

    println!("\nFetch:");
    println!("  Timeout: {}ms", config.fetch.request_timeout);
    println!("  Retries: {}", config.fetch.max_retries);
    if config.fetch.render_enabled() {
        println!("  Render service: {}", config.fetch.render_endpoint);
    } else {
        println!("  Render service: disabled");
    }

    println!("\nClassifier:");
    println!("  Threshold: {}", config.classifier.threshold);
    println!(
        "  Weights: path {} / structure {} / negative {}",
        config.classifier.path_weight,
        config.classifier.structure_weight,
        config.classifier.negative_weight
    );
    println!(
        "  Extra rules: {} product, {} negative",
        config.classifier.product_rules.len(),
        config.classifier.negative_rules.len()
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Format: {:?}", config.output.format);
    if !config.output.database_path.is_empty() {
        println!("  Database: {}", config.output.database_path);
    }

    println!("\nDomains ({}):", parsed.len());
    for root in &parsed {
        println!("  - {}", root);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: Option<String>,
    roots: Vec<String>,
    cli: &Cli,
) -> anyhow::Result<()> {
    let mut service = CrawlService::new(config)?;
    if let Some(hash) = config_hash {
        service = service.with_config_hash(hash);
    }

    let mut request = JobRequest::new(roots);
    request.max_pages_per_domain = cli.max_pages;
    let job = service.submit(request);
    tracing::info!("Started job {}", job);

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.progress_interval.max(1)));
    ticker.tick().await;

    let snapshot = loop {
        tokio::select! {
            snapshot = service.wait(job) => break snapshot,
            _ = ticker.tick() => {
                if let Some(snapshot) = service.status(job) {
                    if !cli.quiet {
                        for line in format_progress(&snapshot) {
                            println!("{}", line);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling job {}", job);
                service.cancel(job);
            }
        }
    };

    let Some(snapshot) = snapshot else {
        bail!("job {} disappeared", job);
    };
    let results = service.results(job).unwrap_or_default();

    if !cli.quiet {
        print_summary(&snapshot, &results);
    }

    if snapshot.status != JobStatus::Completed {
        bail!(
            "job {} {}: {}",
            job,
            snapshot.status,
            snapshot.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}
