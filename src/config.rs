use crate::constants::{
    ACCOUNT_MODULE, BROWSER_USER_AGENT, CONTRACT_PAGE_URL, ETHERSCAN_API_URL,
    LISTING_PAGE_PREFIX, VERIFIED_LISTING_URL,
};
use crate::error::{HarvestError, Result};
use crate::types::SortOrder;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "harvester.toml";
pub const API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub listing: ListingConfig,
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub export: ExportConfig,
    pub import: ImportConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub module: String,
    pub start_block: u64,
    pub end_block: u64,
    pub page_size: u32,
    pub sort: SortOrder,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub cooldown_ms: u64,
    pub pacing_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: ETHERSCAN_API_URL.to_string(),
            api_key: "YourApiKeyToken".to_string(),
            module: ACCOUNT_MODULE.to_string(),
            start_block: 0,
            end_block: 99_999_999,
            page_size: 5000,
            sort: SortOrder::Asc,
            timeout_ms: 2000,
            max_attempts: 5,
            cooldown_ms: 1000,
            pacing_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub base_url: String,
    pub start_page: u32,
    pub end_page: u32,
    pub timeout_ms: u64,
    pub delay_ms: u64,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub csv_path: PathBuf,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: VERIFIED_LISTING_URL.to_string(),
            start_page: 1,
            end_page: 1,
            timeout_ms: 1000,
            delay_ms: 5000,
            output_dir: PathBuf::from("listing"),
            file_prefix: LISTING_PAGE_PREFIX.to_string(),
            csv_path: PathBuf::from("verified_contracts.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub initial_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub backoff_factor: u32,
    pub max_attempts: u32,
    pub cooldown_ms: u64,
    pub pacing_ms: u64,
    pub long_pause_every: usize,
    pub long_pause_ms: u64,
    pub output_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: CONTRACT_PAGE_URL.to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            initial_timeout_ms: 500,
            max_timeout_ms: 6000,
            backoff_factor: 2,
            max_attempts: 4,
            cooldown_ms: 5000,
            pacing_ms: 3000,
            long_pause_every: 500,
            long_pause_ms: 100_000,
            output_dir: PathBuf::from("contract_source"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub identifiers_csv: PathBuf,
    pub start_index: usize,
    /// Inclusive; `None` runs to the end of the identifier list
    pub end_index: Option<usize>,
    pub normal_dir: PathBuf,
    pub internal_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            identifiers_csv: PathBuf::from("verified_contracts.csv"),
            start_index: 0,
            end_index: None,
            normal_dir: PathBuf::from("transactions"),
            internal_dir: PathBuf::from("transactions_internal"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_rows: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("transactions"),
            output_dir: PathBuf::from("temp"),
            max_rows: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub database: PathBuf,
    pub table: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("ethereum.db"),
            table: "transactions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Loads the config file if present, falling back to defaults, then
    /// applies the API key from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                HarvestError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api.api_key = key;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn validate(&self) -> Result<()> {
        if self.api.page_size == 0 {
            return Err(HarvestError::Config("api.page_size must be positive".into()));
        }
        if self.api.max_attempts == 0 || self.source.max_attempts == 0 {
            return Err(HarvestError::Config("max_attempts must be at least 1".into()));
        }
        if self.source.backoff_factor == 0 {
            return Err(HarvestError::Config("source.backoff_factor must be at least 1".into()));
        }
        if self.export.max_rows == 0 {
            return Err(HarvestError::Config("export.max_rows must be positive".into()));
        }
        Ok(())
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.page_size, 5000);
        assert_eq!(config.api.max_attempts, 5);
        assert_eq!(config.api.pacing_ms, 200);
        assert_eq!(config.export.max_rows, 100_000);
        assert_eq!(config.source.max_timeout_ms, 6000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [api]
            api_key = "ABC"
            sort = "desc"

            [fetch]
            start_index = 10
            end_index = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.api.api_key, "ABC");
        assert_eq!(config.api.sort, SortOrder::Desc);
        assert_eq!(config.api.page_size, 5000);
        assert_eq!(config.fetch.start_index, 10);
        assert_eq!(config.fetch.end_index, Some(20));
        assert_eq!(config.listing.delay_ms, 5000);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = Config::from_toml("[export]\nmax_rows = 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
