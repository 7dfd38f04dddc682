use crate::core::retry::RetryPolicy;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackingConfig {
    #[serde(default = "default_update_interval_minutes")]
    pub update_interval_minutes: u64,
    #[serde(default = "default_reference_asset")]
    pub reference_asset: String,
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
}

fn default_update_interval_minutes() -> u64 {
    5
}

fn default_reference_asset() -> String {
    "BTC".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    1000
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            update_interval_minutes: default_update_interval_minutes(),
            reference_asset: default_reference_asset(),
            demo_mode: false,
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
        }
    }
}

impl TrackingConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.max(1) * 60)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeRateConfig {
    pub api_url: String,
    /// Code of the fiat currency looked up in the response's `rates` map.
    pub currency: String,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        ExchangeRateConfig {
            api_url: "https://open.er-api.com/v6/latest/USD".to_string(),
            currency: "NOK".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub quote_asset: String,
    #[serde(default)]
    pub excluded_symbols: Vec<String>,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        BinanceConfig {
            base_url: "https://api.binance.com".to_string(),
            quote_asset: "USDT".to_string(),
            excluded_symbols: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ManualBalance {
    pub asset: String,
    pub available: Decimal,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoAsset {
    pub asset_name: String,
    pub coingecko_id: String,
    /// Moment `initial_total` was last known.
    pub total_date: NaiveDateTime,
    pub initial_total: Decimal,
    #[serde(default)]
    pub tokens_per_day: Decimal,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoConfig {
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
    #[serde(default)]
    pub assets: Vec<CoinGeckoAsset>,
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DirectusConfig {
    pub host: String,
    pub api_key: String,
    pub coin_values_endpoint: String,
    pub total_balance_endpoint: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub logging_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    #[serde(alias = "excel")]
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            _ => Err(anyhow!("Unsupported export format: {}", s)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default = "default_values_filename")]
    pub values_filename: String,
    #[serde(default = "default_totals_filename")]
    pub totals_filename: String,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_values_filename() -> String {
    "crypto-portfolio-values".to_string()
}

fn default_totals_filename() -> String {
    "crypto-portfolio-totals".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("exports")
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            enabled: false,
            format: ExportFormat::default(),
            values_filename: default_values_filename(),
            totals_filename: default_totals_filename(),
            output_path: default_output_path(),
        }
    }
}

impl ExportConfig {
    pub fn values_path(&self) -> PathBuf {
        self.output_path
            .join(format!("{}.{}", self.values_filename, self.format.extension()))
    }

    pub fn totals_path(&self) -> PathBuf {
        self.output_path
            .join(format!("{}.{}", self.totals_filename, self.format.extension()))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub exchange_rate: ExchangeRateConfig,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub manual_balances: Vec<ManualBalance>,
    #[serde(default)]
    pub coingecko: Option<CoinGeckoConfig>,
    #[serde(default)]
    pub directus: Option<DirectusConfig>,
    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "cointrack", "cointrack")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Telemetry settings, present only when the section exists and is enabled.
    pub fn active_directus(&self) -> Option<&DirectusConfig> {
        self.directus.as_ref().filter(|d| d.enabled)
    }
}
