//! Tracker CLI
//!
//! Relays Steam announcement comments and feed entries to webhooks.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracker::{
    config::{self, Overrides},
    error::Result,
    models::{Config, LoggingConfig},
    pipeline::{self, RelayOutcome},
    storage::{JsonFileStore, WatermarkStore},
    utils::{http, redact_webhook},
};

/// Steam community tracker
#[derive(Parser, Debug)]
#[command(
    name = "tracker",
    version,
    about = "Relay Steam comments and feed entries to chat webhooks"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "tracker.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Append log lines to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay new comments under the newest announcements
    Comments,

    /// Relay new and edited feed entries
    Feed,

    /// Comments, then feed
    Run,

    /// Validate the configuration file
    Validate,

    /// Show stored markers
    Info,
}

/// Initialize logging from the effective logging settings.
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&logging.level));
    builder.format_timestamp_secs();

    if let Some(path) = &logging.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        verbose: cli.verbose,
        log_file: cli.log_file.clone(),
    };
    let loaded = config::load(&cli.config, &overrides);
    init_logging(&loaded.config.logging)?;

    if let Some(e) = &loaded.fallback {
        log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        );
    }

    if let Err(e) = run(cli.command, &loaded.config).await {
        log::error!("{}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Comments => {
            config.validate()?;
            let client = http::create_async_client(&config.http)?;
            let outcome = pipeline::run_comments(config, &client).await?;
            report("comments", &outcome);
        }

        Command::Feed => {
            config.validate()?;
            let client = http::create_async_client(&config.http)?;
            let outcome = pipeline::run_feed(config, &client).await?;
            report("feed", &outcome);
        }

        Command::Run => {
            config.validate()?;
            let client = http::create_async_client(&config.http)?;

            log::info!("Step 1/2: Relaying comments...");
            let mut outcome = pipeline::run_comments(config, &client).await?;

            log::info!("Step 2/2: Relaying feeds...");
            outcome.merge(&pipeline::run_feed(config, &client).await?);

            report("run", &outcome);
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!(
                "Config OK: {} destinations, {} apps, {} feeds",
                config.delivery.destinations().len(),
                config.comments.app_ids.len(),
                config.feed.urls.len()
            );
        }

        Command::Info => {
            show_store("comments", &config.comments.store_path).await?;
            show_store("feed", &config.feed.store_path).await?;
        }
    }

    Ok(())
}

fn report(label: &str, outcome: &RelayOutcome) {
    log::info!(
        "Done ({}): {} items, {} new, {} updated, {} already sent, {} too old",
        label,
        outcome.items,
        outcome.delivered_new,
        outcome.delivered_updated,
        outcome.skipped_seen,
        outcome.skipped_stale
    );
}

async fn show_store(label: &str, path: &Path) -> Result<()> {
    let store = JsonFileStore::open(path).await?;
    let ledger = store.ledger();

    log::info!("{} store: {}", label, path.display());
    if ledger.is_empty() {
        log::info!("  (empty)");
    }
    for (destination, groups) in ledger {
        log::info!("  {} ({} groups)", redact_webhook(destination), groups.len());
        for (group, marker) in groups {
            log::info!("    {} = {}", group, marker);
        }
    }
    Ok(())
}
