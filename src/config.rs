// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use tracing::debug;

use crate::fetch::RetryPolicy;

pub const CONFIG_ENV: &str = "AUTOSALES_CONFIG";
pub const SOURCE_ENV: &str = "AUTOSALES_SOURCE";

pub const DEFAULT_SOURCE: &str = "https://cf-courses-data.s3.us.cloud-object-storage.appdomain.cloud/IBMDeveloperSkillsNetwork-DV0101EN-SkillsNetwork/Data%20Files/historical_automobile_sales.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL or local path of the sales CSV.
    pub source: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub fetch_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            log_filter: "info".to_string(),
            fetch_retries: 0,
            retry_delay_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from `path` (or `$AUTOSALES_CONFIG`), then apply `$AUTOSALES_SOURCE`.
    /// No file at all means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = env::var(CONFIG_ENV).ok();
        let path = path.or(from_env.as_deref().map(Path::new));

        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        if let Ok(source) = env::var(SOURCE_ENV) {
            if !source.trim().is_empty() {
                cfg.source = source;
            }
        }
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        let cfg: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {:?}", path))?;
        debug!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.fetch_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
