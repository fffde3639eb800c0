use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use omega_notify::NotifyConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "omega.config.json";

/// Typed view of `omega.config.json`. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OmegaConfig {
    pub db_path: PathBuf,
    pub csv_path: PathBuf,
    pub poll_minutes: u64,
    pub rss_feeds: Vec<String>,
    pub notify: NotifyConfig,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for OmegaConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("omega.db"),
            csv_path: PathBuf::from("opportunities.csv"),
            poll_minutes: 10,
            rss_feeds: Vec::new(),
            notify: NotifyConfig::default(),
            http_timeout_secs: 20,
            user_agent: "omega-prime/0.1".to_string(),
        }
    }
}

impl OmegaConfig {
    /// Read and parse the config document. Missing or malformed files are errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interval between passes in watch mode, never shorter than a minute.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_minutes.max(1).saturating_mul(60))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}
