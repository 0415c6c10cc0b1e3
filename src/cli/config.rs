use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;

/// Environment variable overriding [`BrowserSettings::webdriver_url`].
pub const WEBDRIVER_URL_ENV: &str = "TICKETWATCH_WEBDRIVER_URL";

/// Environment variable overriding [`BrowserSettings::binary_path`].
pub const BROWSER_PATH_ENV: &str = "TICKETWATCH_BROWSER_PATH";

/// Upper bound on pages open at once
pub const MAX_CONCURRENCY: usize = 64;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scrape: ScrapeConfig,
    pub browser: BrowserSettings,
    pub site: SiteSettings,
    pub server: ServerSettings,
}

/// Per-batch fetch settings. Never mutated once a batch starts.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Attempts per target, including the first one
    pub max_retries: u32,
    /// Backoff base; attempt `i` is followed by `base * 2^i`
    pub base_delay_ms: u64,
    pub navigation_timeout_ms: u64,
    pub primary_wait_timeout_ms: u64,
    pub network_idle_timeout_ms: u64,
    /// How long the network must stay quiet to count as idle
    pub network_quiet_ms: u64,
    pub grace_delay_ms: u64,
    pub popup_click_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Pages allowed open at the same time
    pub concurrency: usize,
    pub viewport: Viewport,
}

/// Browser viewport settings
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// How the browser process and its context are set up
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    /// Pre-provisioned browser binary; `None` lets the driver pick its default
    pub binary_path: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    pub locale: String,
    pub extra_headers: HashMap<String, String>,
    /// URL patterns aborted before loading (images, fonts, media)
    pub blocked_resource_patterns: Vec<String>,
}

/// What counts as a valid target and where the data lives on its pages
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SiteSettings {
    pub allowed_domains: Vec<String>,
    /// Path segment every event page contains
    pub event_path_marker: String,
    pub selectors: SelectorSettings,
    pub popup_labels: Vec<String>,
}

/// CSS selectors for the event listing
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SelectorSettings {
    pub listing: String,
    pub row: String,
    pub date: String,
    pub description: String,
    pub remaining: String,
    pub title_headings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
            navigation_timeout_ms: 90_000,
            primary_wait_timeout_ms: 45_000,
            network_idle_timeout_ms: 15_000,
            network_quiet_ms: 500,
            grace_delay_ms: 1_500,
            popup_click_timeout_ms: 800,
            poll_interval_ms: 250,
            concurrency: 3,
            viewport: Viewport {
                width: 1280,
                height: 900,
            },
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let mut extra_headers = HashMap::new();
        extra_headers.insert(
            "Accept-Language".to_string(),
            "zh-TW,zh;q=0.9,en;q=0.8".to_string(),
        );
        extra_headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());

        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            binary_path: None,
            headless: true,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            locale: "zh-TW".to_string(),
            extra_headers,
            blocked_resource_patterns: [
                "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico",
                "*.woff", "*.woff2", "*.ttf", "*.otf",
                "*.mp4", "*.webm", "*.mp3", "*.m3u8",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["opentix.life".to_string()],
            event_path_marker: "/event/".to_string(),
            selectors: SelectorSettings::default(),
            popup_labels: ["同意", "接受", "我知道了", "確定", "OK", "關閉", "×"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
        }
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            listing: ".events__list__table".to_string(),
            row: ".column__body".to_string(),
            date: ".date .mr-2".to_string(),
            description: ".date .description".to_string(),
            remaining: ".priceplans_wrapper .remain_infos > span".to_string(),
            title_headings: vec![
                "h1".to_string(),
                ".event-title".to_string(),
                ".title".to_string(),
                "h2".to_string(),
            ],
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ScrapeConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn primary_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_wait_timeout_ms)
    }

    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    pub fn network_quiet(&self) -> Duration {
        Duration::from_millis(self.network_quiet_ms)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn popup_click_timeout(&self) -> Duration {
        Duration::from_millis(self.popup_click_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl AppConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("life", "ticketwatch", "ticketwatch") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Path of the configuration used when `--config` is not given
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the configuration from `path`, or from the default location.
    ///
    /// A missing default file is created from the built-in defaults. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    info!("Default configuration not found. Creating...");
                    let config = Self::default();
                    if let Err(e) = config.save_to_file(&default_path) {
                        warn!("Could not write default configuration: {:#}", e);
                    }
                    config
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(WEBDRIVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.browser.webdriver_url = url.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var(BROWSER_PATH_ENV) {
            if !path.trim().is_empty() {
                self.browser.binary_path = Some(PathBuf::from(path.trim()));
            }
        }
    }

    /// Reject settings no batch could run with
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.scrape.concurrency == 0 || self.scrape.concurrency > MAX_CONCURRENCY {
            return Err(ScrapeError::Config(format!(
                "concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if self.scrape.max_retries == 0 {
            return Err(ScrapeError::Config("max_retries must be at least 1".to_string()));
        }
        if self.site.allowed_domains.iter().all(|d| d.trim().is_empty()) {
            return Err(ScrapeError::Config("allowed_domains is empty".to_string()));
        }
        if self.site.event_path_marker.trim().is_empty() {
            return Err(ScrapeError::Config("event_path_marker is empty".to_string()));
        }
        crate::parser::ListingParser::new(&self.site.selectors)?;
        Ok(())
    }
}
