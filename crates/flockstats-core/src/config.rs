//! Application configuration management.
//!
//! Configuration is stored at `~/.config/flockstats/config.json`. Every field
//! has a default, so a missing file (or missing fields) is fine. The API URL
//! and bearer token can also come from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "flockstats";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const ENV_API_URL: &str = "FLOCKSTATS_API_URL";

/// Environment variable holding the bearer token
pub const ENV_TOKEN: &str = "FLOCKSTATS_TOKEN";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Freshness window for cached stats
    pub cache_ttl_ms: u64,
    /// Delay before revalidating stats that were just served from cache
    pub background_refresh_delay_ms: u64,
    /// Period of the background refresh while a view is open
    pub poll_interval_ms: u64,
    pub max_cache_entries: usize,
    /// Mirror the cache to disk so it survives restarts
    pub persist_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache_ttl_ms: 300_000,
            background_refresh_delay_ms: 100,
            poll_interval_ms: 30_000,
            max_cache_entries: 256,
            persist_cache: true,
        }
    }
}

impl Config {
    /// Load the config file (or defaults), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
    }

    /// Bearer token from the environment, if any
    pub fn token_from_env() -> Option<String> {
        std::env::var(ENV_TOKEN).ok().filter(|t| !t.trim().is_empty())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn background_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.background_refresh_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
