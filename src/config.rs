use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fanout::{FailurePolicy, FanOut};
use crate::http::RetryPolicy;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub azure_devops: AzureDevOpsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub fan_out: FanOutConfig,
    pub completion: Option<CompletionConfig>,
}

/// Empty values are not rejected here; the service answers them with an auth error.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AzureDevOpsConfig {
    #[serde(default)]
    pub organization_url: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub personal_access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub network_backoff_ms: u64,
    pub unavailable_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            network_backoff_ms: policy.network_backoff.as_millis() as u64,
            unavailable_backoff_ms: policy.unavailable_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            network_backoff: Duration::from_millis(self.network_backoff_ms),
            unavailable_backoff: Duration::from_millis(self.unavailable_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FanOutConfig {
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl FanOutConfig {
    pub fn fan_out(&self) -> FanOut {
        FanOut {
            max_concurrency: self.max_concurrency,
            failure_policy: self.failure_policy,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CompletionConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    pub system_message: Option<String>,
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ado-extract")
}

fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Load `~/.ado-extract/config.toml`, then let `.env` and the environment override it.
pub fn load_config() -> Result<AppConfig> {
    let _ = dotenvy::dotenv();
    let mut config = load_config_from(&config_path())?;
    apply_env(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

fn apply_env(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("ADO_PERSONAL_ACCESS_TOKEN") {
        config.azure_devops.personal_access_token = v;
    }
    if let Some(v) = var("ADO_ORGANIZATION_URL") {
        config.azure_devops.organization_url = v;
    }
    if let Some(v) = var("ADO_TEAM_PROJECT") {
        config.azure_devops.project = v;
    }

    let url = var("AOAI_URL");
    let key = var("AOAI_KEY");
    if url.is_some() || key.is_some() {
        let completion = config.completion.get_or_insert_with(CompletionConfig::default);
        if let Some(url) = url {
            completion.url = url;
        }
        if let Some(key) = key {
            completion.api_key = key;
        }
    }
}
