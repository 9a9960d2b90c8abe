mod config;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{AppConfig, LoggingConfig};
use crate::pipeline::Pipeline;
use crate::scraper::TgjuDriver;
use crate::storage::DatasetStore;

#[derive(Parser)]
#[command(name = "euro-scraper", about = "EUR/IRR daily price history scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Scrape every page even if a dataset already exists
    #[arg(long, global = true)]
    full: bool,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape new rows and merge them into the dataset (default)
    Run,

    /// Show dataset statistics
    Stats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.verbose, &config.logging);

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => scrape(config, cli.full).await,
        Command::Stats => stats(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            println!("\n{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Console + log file, both with timestamp and level. Set up once per process.
fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = match verbose {
        0 => "euro_rial_scraper=info,warn",
        1 => "euro_rial_scraper=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let (file_layer, file_err) = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logging.log_file)
    {
        Ok(f) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(f)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(file_layer)
        .with(filter)
        .init();

    if let Some(e) = file_err {
        warn!("Could not open log file {:?}: {}", logging.log_file, e);
    }
}

async fn scrape(config: AppConfig, force_full: bool) -> Result<()> {
    let csv_path = config.storage.csv_path();

    println!("{}", "=".repeat(60));
    println!("EUR/IRR Exchange Rate Scraper");
    println!("{}", "=".repeat(60));
    println!("Target: {}", config.scraper.history_url);
    println!("Output: {}", csv_path.display());
    println!("{}", "=".repeat(60));

    let _t = utils::Timer::start("Scrape run");

    let driver = TgjuDriver::new(&config.scraper).context("Failed to initialize page driver")?;
    let store = DatasetStore::open(&csv_path);
    let mut pipeline = Pipeline::new(
        driver,
        store,
        config.scraper.table_url.clone(),
        config.pipeline.clone(),
    );

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping before the next page (Ctrl-C again to abort now)");
            cancel.store(true, Ordering::SeqCst);
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(1);
            }
        }
    });

    println!("\nStarting scraper...");
    let stats = pipeline.run(force_full).await.context("Scraping failed")?;

    info!(
        "Done: {} mode | {} pages | {} accepted | {} new records | stop: {:?}",
        stats.mode, stats.pages, stats.accepted, stats.new_records, stats.stop
    );
    println!("\nScraping completed successfully!");
    println!("Check {} for your CSV file.", pipeline.store().path().display());
    println!(
        "{} new record(s); dataset now holds {} ({}).",
        stats.new_records,
        utils::fmt_number(stats.summary.total_records as i64),
        stats.summary.date_range.as_deref().unwrap_or("—")
    );
    Ok(())
}

fn stats(config: &AppConfig) -> Result<()> {
    let store = DatasetStore::open(config.storage.csv_path());
    let summary = store.summary();

    println!("─────────────────────────────────");
    println!("  EUR/IRR — Dataset Stats");
    println!("─────────────────────────────────");
    println!("  File     : {}", store.path().display());
    println!("  Records  : {}", utils::fmt_number(store.len() as i64));
    println!("  From     : {}", summary.oldest_date.as_deref().unwrap_or("—"));
    println!("  To       : {}", summary.latest_date.as_deref().unwrap_or("—"));
    if let Some(close) = store.records().first().and_then(|r| r.close_price) {
        println!("  Close    : {}", utils::fmt_number(close));
    }
    println!("─────────────────────────────────");
    Ok(())
}
