use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scraper / page driver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// DataTables server-side source behind the history table.
    #[serde(default = "default_table_url")]
    pub table_url: String,

    /// Human-facing page the table lives on (banner only).
    #[serde(default = "default_history_url")]
    pub history_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_csv_filename")]
    pub csv_filename: String,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Pause between consecutive page advances.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Scrape every page even when a dataset already exists.
    #[serde(default)]
    pub full_scrape: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_table_url() -> String {
    "https://api.tgju.org/v1/market/indicator/summary-table-data/price_eur".to_string()
}
fn default_history_url() -> String {
    "https://www.tgju.org/profile/price_eur/history".to_string()
}
fn default_page_size() -> u32 {
    30
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> usize {
    3
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_csv_filename() -> String {
    "Euro_Rial_Price_Dataset.csv".to_string()
}
fn default_page_delay_ms() -> u64 {
    1000
}
fn default_log_file() -> PathBuf {
    PathBuf::from("scraper.log")
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            table_url: default_table_url(),
            history_url: default_history_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            csv_filename: default_csv_filename(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: default_page_delay_ms(),
            full_scrape: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

impl StorageConfig {
    pub fn csv_path(&self) -> PathBuf {
        self.data_dir.join(&self.csv_filename)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("EURO").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        cfg.try_deserialize().context("Invalid configuration")
    }
}
