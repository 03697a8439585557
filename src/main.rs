//! record-trawler main entry point
//!
//! This is the command-line interface for the record-trawler crawler.

use anyhow::Context;
use clap::Parser;
use record_trawler::config::{load_config_with_hash, Config};
use record_trawler::crawler::{progress_channel, Orchestrator};
use record_trawler::output::{print_summary, write_json_lines, write_rejections};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// record-trawler: a concurrent structured-record crawler
///
/// Crawls seed pages under a rate limit, extracts fields with declarative
/// rules, validates them and prints the deduplicated records as JSON lines
/// on stdout. Logs and the run summary go to stderr.
#[derive(Parser, Debug)]
#[command(name = "record-trawler")]
#[command(version)]
#[command(about = "A concurrent structured-record crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Also write rejected records and their violations to this file
    #[arg(long, value_name = "PATH")]
    rejections: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(&config, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs always go to stderr; stdout carries only records.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("record_trawler=info,warn"),
            1 => EnvFilter::new("record_trawler=debug,info"),
            2 => EnvFilter::new("record_trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    eprintln!("=== record-trawler Dry Run ===\n");

    eprintln!("Crawler Configuration:");
    eprintln!("  Concurrency: {}", config.crawler.concurrency);
    eprintln!(
        "  Rate: {} req/s (burst {})",
        config.crawler.requests_per_second, config.crawler.burst
    );
    eprintln!("  Max attempts: {}", config.crawler.max_attempts);
    eprintln!("  Max depth: {}", config.crawler.max_depth);
    eprintln!("  Max targets: {}", config.crawler.max_targets);

    eprintln!("\nUser Agent: {}", config.user_agent.header_value());

    eprintln!("\nRule Sets ({}):", config.rule_sets.len());
    for set in &config.rule_sets {
        let follows = set.rules.iter().filter(|r| r.follow).count();
        eprintln!(
            "  - {} ({} field(s), {} follow rule(s){})",
            set.name,
            set.rules.len() - follows,
            follows,
            set.scope
                .as_deref()
                .map(|s| format!(", scope '{s}'"))
                .unwrap_or_default()
        );
    }

    eprintln!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        eprintln!(
            "  - {} [{}]",
            seed.url,
            seed.rule_set.as_deref().unwrap_or("default")
        );
    }

    eprintln!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let (progress, mut events) = progress_channel();
    let orchestrator = Orchestrator::new(config)?.with_progress(progress);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight targets");
            cancel.cancel();
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::trace!("{} {} -> {}", event.target, event.url, event.state);
        }
    });

    let report = orchestrator.run(&config.seeds).await?;

    write_json_lines(&report.dataset, BufWriter::new(io::stdout().lock()))
        .context("failed to write records")?;

    if let Some(path) = &cli.rejections {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        write_rejections(&report.rejected, BufWriter::new(file))
            .context("failed to write rejections")?;
    }

    if !cli.quiet {
        print_summary(&report.summary);
    }

    Ok(())
}
