use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub visits: VisitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Take the requester IP from `X-Forwarded-For` / `X-Real-IP`.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub username: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    /// Name of an environment variable holding a GitHub token.
    #[serde(default)]
    pub token_env: Option<String>,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_catalog_timeout_secs() -> u64 {
    15
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeoConfig {
    #[serde(default = "default_geo_provider")]
    pub provider: String,
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_geo_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            provider: default_geo_provider(),
            endpoint: default_geo_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_geo_timeout_secs(),
        }
    }
}

fn default_geo_provider() -> String {
    "disabled".to_string()
}
fn default_geo_endpoint() -> String {
    "https://ipgeolocation.abstractapi.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "ABSTRACT_API_KEY".to_string()
}
fn default_geo_timeout_secs() -> u64 {
    5
}

impl GeoConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisitsConfig {
    #[serde(default = "default_query_limit")]
    pub query_limit: i64,
}

impl Default for VisitsConfig {
    fn default() -> Self {
        Self {
            query_limit: default_query_limit(),
        }
    }
}

fn default_query_limit() -> i64 {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.catalog.username.trim().is_empty() {
        anyhow::bail!("catalog.username must not be empty");
    }
    if config.catalog.timeout_secs == 0 {
        anyhow::bail!("catalog.timeout_secs must be > 0");
    }
    if config.catalog.refresh_interval_secs == Some(0) {
        anyhow::bail!("catalog.refresh_interval_secs must be > 0 when set");
    }

    if config.geo.timeout_secs == 0 {
        anyhow::bail!("geo.timeout_secs must be > 0");
    }
    match config.geo.provider.as_str() {
        "disabled" | "abstract" => {}
        other => anyhow::bail!(
            "Unknown geo provider: '{}'. Must be disabled or abstract.",
            other
        ),
    }

    if !(1..=500).contains(&config.visits.query_limit) {
        anyhow::bail!("visits.query_limit must be in [1, 500]");
    }

    Ok(())
}
