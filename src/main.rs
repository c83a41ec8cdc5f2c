//! spa-mirror main entry point
//!
//! This is the command-line interface for the spa-mirror static site mirror.

use anyhow::Context;
use clap::Parser;
use spa_mirror::config::{load_config_with_hash, validate, Config};
use spa_mirror::crawler::crawl;
use spa_mirror::output::print_statistics;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// spa-mirror: a static mirror builder for client-rendered websites
///
/// spa-mirror logs into a single-page application, renders its pages,
/// discovers links from the DOM and the hydration state, and writes pages
/// and assets into a tree that a static web server can serve.
#[derive(Parser, Debug)]
#[command(name = "spa-mirror")]
#[command(version = "1.0.0")]
#[command(about = "Mirror a client-rendered website into static files", long_about = None)]
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

    /// Validate config and show what would be mirrored without crawling
    #[arg(long)]
    dry_run: bool,

    /// Write the mirror here instead of `output.out-dir`
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Additional crawl entrypoint (repeatable)
    #[arg(long = "entrypoint", value_name = "URL")]
    entrypoints: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_cli_overrides(&mut config, &cli);
    validate(&config).context("invalid command-line overrides")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("spa_mirror=info,warn"),
            1 => EnvFilter::new("spa_mirror=debug,info"),
            2 => EnvFilter::new("spa_mirror=trace,debug"),
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

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(out_dir) = &cli.out_dir {
        config.output.out_dir = out_dir.display().to_string();
    }
    config
        .site
        .entrypoints
        .extend(cli.entrypoints.iter().cloned());
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== spa-mirror Dry Run ===\n");
    println!("{}", config.redacted_summary());
    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start mirroring from {} entrypoint(s)",
        1 + config.site.entrypoints.len()
    );
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Mirroring {} into {} ({} session(s), {} concurrent page(s))",
        config.site.base_url,
        config.output.out_dir,
        config.session.pool_size,
        config.crawler.max_concurrent_pages
    );

    match crawl(config).await {
        Ok(stats) => {
            tracing::info!("Crawl completed successfully");
            print_statistics(&stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
