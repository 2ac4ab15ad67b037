use crate::core::rate::FailurePolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_CRYPTONATOR_URL: &str = "https://www.cryptonator.com/api";
pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateProviderConfig {
    #[serde(default = "default_cryptonator_url")]
    pub base_url: String,
    pub timeout_secs: Option<u64>,
    /// Maximum in-flight pair-queries; unbounded when absent.
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub retries: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for RateProviderConfig {
    fn default() -> Self {
        RateProviderConfig {
            base_url: default_cryptonator_url(),
            timeout_secs: None,
            max_concurrency: None,
            retries: 0,
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone)]
pub struct AccountProviderConfig {
    #[serde(default = "default_binance_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub recv_window: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl Default for AccountProviderConfig {
    fn default() -> Self {
        AccountProviderConfig {
            base_url: default_binance_url(),
            api_key: None,
            secret_key: None,
            recv_window: None,
            timeout_secs: None,
        }
    }
}

// Keeps credentials out of debug logs.
impl std::fmt::Debug for AccountProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("AccountProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("recv_window", &self.recv_window)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub cryptonator: RateProviderConfig,
    #[serde(default)]
    pub binance: AccountProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_currencies")]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub history_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            currencies: default_currencies(),
            providers: ProvidersConfig::default(),
            history_path: None,
        }
    }
}

fn default_cryptonator_url() -> String {
    DEFAULT_CRYPTONATOR_URL.to_string()
}

fn default_binance_url() -> String {
    DEFAULT_BINANCE_URL.to_string()
}

fn default_currencies() -> Vec<String> {
    vec![DEFAULT_CURRENCY.to_string()]
}

/// Splits a comma separated currency list, dropping blanks.
pub fn parse_currencies(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Trims and upper-cases codes, dropping blanks and repeats in order.
pub fn normalize_currencies(currencies: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(currencies.len());
    for code in currencies {
        let code = code.trim().to_uppercase();
        if !code.is_empty() && !normalized.contains(&code) {
            normalized.push(code);
        }
    }
    normalized
}

impl AppConfig {
    /// Loads the default config file if present, then applies environment overrides.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        let config = if config_path.exists() {
            Self::read_file(&config_path)?
        } else {
            debug!("No config at {}, using defaults", config_path.display());
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "cwc", "cwc")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn history_file_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.history_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "cwc", "cwc")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().join("history.json"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    fn read_file(path: &std::path::Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Overrides credentials and currencies from `BINANCE_API_KEY`,
    /// `BINANCE_SECRET_KEY` and `CURRENCIES`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("BINANCE_API_KEY").filter(|v| !v.is_empty()) {
            self.providers.binance.api_key = Some(key);
        }
        if let Some(secret) = lookup("BINANCE_SECRET_KEY").filter(|v| !v.is_empty()) {
            self.providers.binance.secret_key = Some(secret);
        }
        if let Some(currencies) = lookup("CURRENCIES") {
            let currencies = parse_currencies(&currencies);
            if !currencies.is_empty() {
                self.currencies = currencies;
            }
        }
        self.currencies = normalize_currencies(&self.currencies);
        if self.currencies.is_empty() {
            self.currencies = default_currencies();
        }
        self
    }
}
