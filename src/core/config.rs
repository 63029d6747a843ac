use crate::core::fees::FeeSchedule;
use crate::core::model::UserId;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Yahoo,
    #[default]
    Simulated,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SimulatedProviderConfig {
    /// Fixed seed for reproducible runs; a random one is drawn when absent.
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub yahoo: YahooProviderConfig,
    pub simulated: SimulatedProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshSettings {
    pub interval_secs: u64,
    /// Pause between two symbol fetches within a cycle.
    pub pacing_ms: u64,
    pub max_backoff_secs: u64,
    /// Consecutive all-failed cycles before the wait starts to grow.
    pub failure_threshold: u32,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            pacing_ms: 2000,
            max_backoff_secs: 21600,
            failure_threshold: 3,
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub users: Vec<UserId>,
    pub fees: FeeSchedule,
    pub price_source: PriceSource,
    pub providers: ProvidersConfig,
    pub refresh: RefreshSettings,
    pub data_path: Option<String>,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("in", "rewardledger", "rewardledger")
        .context("Could not determine project directories")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!(users = config.users.len(), source = ?config.price_source, "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.fees.negative_rate() {
            bail!("fees.{rate} must not be negative");
        }
        if self.refresh.interval_secs == 0 {
            bail!("refresh.interval_secs must be greater than zero");
        }
        Ok(())
    }
}
