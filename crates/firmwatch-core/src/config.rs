//! Run configuration.
//!
//! Configuration is stored at `~/.config/firmwatch/config.json`. Every field is
//! optional in the file; missing fields take the defaults below. A handful of
//! environment variables override the file:
//!
//! - `FIRMWATCH_BASE_URL`
//! - `FIRMWATCH_DATA_DIR`
//! - `FIRMWATCH_ORGANIZATIONS` (comma separated)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Application name used for config/data directory paths
const APP_NAME: &str = "firmwatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "https://www.lawnb.com";
const DEFAULT_SEARCH_PATH: &str = "/Info/ContentMain/Lawyer";
const DEFAULT_PAGE_PARAM: &str = "pageIndex";

/// Firms tracked when no list is configured, in processing order
const DEFAULT_ORGANIZATIONS: [&str; 13] = [
    "김앤장",
    "광장",
    "세종",
    "태평양",
    "율촌",
    "화우",
    "바른",
    "지평",
    "와이케이",
    "대륜",
    "대륙아주",
    "동인",
    "로고스",
];

pub const ENV_BASE_URL: &str = "FIRMWATCH_BASE_URL";
pub const ENV_DATA_DIR: &str = "FIRMWATCH_DATA_DIR";
pub const ENV_ORGANIZATIONS: &str = "FIRMWATCH_ORGANIZATIONS";

// Lower bounds applied to configured delays. Pacing can be slowed down but
// never switched off.
const MIN_PAGE_DELAY_MS: u64 = 500;
const MIN_ORGANIZATION_DELAY_MS: u64 = 1000;
const MIN_PROBE_GAP_MS: u64 = 500;
const MIN_SETTLE_DELAY_MS: u64 = 500;
const MIN_WAIT_TIMEOUT_MS: u64 = 1000;
const MIN_NAVIGATION_TIMEOUT_MS: u64 = 5000;
const MIN_POLL_INTERVAL_MS: u64 = 50;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no organizations configured")]
    NoOrganizations,

    #[error("base URL `{url}` is unusable: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("could not determine a data directory; set FIRMWATCH_DATA_DIR")]
    NoDataDir,

    #[error("could not determine the config directory")]
    NoConfigDir,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Delays and timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Pause between result pages of one organization
    pub page_delay_ms: u64,
    /// Pause between organizations in the crawl phase
    pub organization_delay_ms: u64,
    /// Pause between organizations in the probe phase
    pub probe_gap_ms: u64,
    /// Wait after submitting the search before reading results
    pub settle_delay_ms: u64,
    /// Upper bound for a page change to show up in the indicator
    pub wait_timeout_ms: u64,
    /// Upper bound for a single navigation call
    pub navigation_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_delay_ms: 1000,
            organization_delay_ms: 2000,
            probe_gap_ms: 1000,
            settle_delay_ms: 3000,
            wait_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

fn floored(value_ms: u64, floor_ms: u64) -> Duration {
    Duration::from_millis(value_ms.max(floor_ms))
}

impl Pacing {
    pub fn page_delay(&self) -> Duration {
        floored(self.page_delay_ms, MIN_PAGE_DELAY_MS)
    }

    pub fn organization_delay(&self) -> Duration {
        floored(self.organization_delay_ms, MIN_ORGANIZATION_DELAY_MS)
    }

    pub fn probe_gap(&self) -> Duration {
        floored(self.probe_gap_ms, MIN_PROBE_GAP_MS)
    }

    pub fn settle_delay(&self) -> Duration {
        floored(self.settle_delay_ms, MIN_SETTLE_DELAY_MS)
    }

    pub fn wait_timeout(&self) -> Duration {
        floored(self.wait_timeout_ms, MIN_WAIT_TIMEOUT_MS)
    }

    pub fn navigation_timeout(&self) -> Duration {
        floored(self.navigation_timeout_ms, MIN_NAVIGATION_TIMEOUT_MS)
    }

    pub fn poll_interval(&self) -> Duration {
        floored(self.poll_interval_ms, MIN_POLL_INTERVAL_MS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub search_path: String,
    /// Query parameter used to request a page when the pager is script-driven
    pub page_query_param: String,
    pub organizations: Vec<String>,
    pub data_dir: Option<PathBuf>,
    /// Write a daily log file here in addition to stderr
    pub log_dir: Option<PathBuf>,
    /// Drop scraped rows whose printed organization is not the one searched for
    pub strict_organization_match: bool,
    pub pacing: Pacing,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            page_query_param: DEFAULT_PAGE_PARAM.to_string(),
            organizations: DEFAULT_ORGANIZATIONS.iter().map(|s| s.to_string()).collect(),
            data_dir: None,
            log_dir: None,
            strict_organization_match: true,
            pacing: Pacing::default(),
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, contents).map_err(write_err)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(base_url) = non_blank(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(dir) = non_blank(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(list) = non_blank(ENV_ORGANIZATIONS) {
            self.organizations = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Organization names in processing order, blanks and repeats removed.
    pub fn organizations(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.organizations
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty() && seen.insert(o.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Absolute URL of the directory search page.
    pub fn search_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let base = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", base.scheme())));
        }
        if base.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        base.join(&self.search_path).map_err(|e| invalid(e.to_string()))
    }

    /// Directory for the JSON store.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match self.data_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join(APP_NAME))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    /// Pre-flight check run before any organization is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.organizations().is_empty() {
            return Err(ConfigError::NoOrganizations);
        }
        self.search_url()?;
        self.data_dir()?;
        Ok(())
    }
}
