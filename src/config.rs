use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Accepted for forward compatibility; not applied to entries yet.
    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default = "default_verify")]
    pub verify: bool,

    #[serde(default)]
    pub use_metadata: bool,

    #[serde(default)]
    pub sort_key: SortKey,
}

/// Key used to order a feed's entries newest-first before scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Published,
    Link,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_database_path() -> String {
    "rss_database.zip".to_string()
}

fn default_verify() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!("{} does not exist", path.display())));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| AppError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
