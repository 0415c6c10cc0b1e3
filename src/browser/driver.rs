//! Browser automation capabilities the scraper relies on.
//!
//! The orchestrator only talks to these traits; [`crate::browser::webdriver`] implements
//! them over a WebDriver endpoint.

use async_trait::async_trait;
use std::time::Duration;

use crate::cli::config::{BrowserSettings, ScrapeConfig};
use crate::error::ScrapeError;

/// One browser tab, exclusively owned by a single worker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserPage: Send {
    /// Navigate and return once the DOM has been constructed.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Poll until `selector` matches at least one element. `Ok(false)` on timeout.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool, ScrapeError>;

    /// Wait until no network activity has been seen for `quiet`. `Ok(false)` on timeout.
    async fn wait_for_network_idle(&mut self, quiet: Duration, timeout: Duration) -> Result<bool, ScrapeError>;

    /// Click the first visible button whose text is `label`. `Ok(false)` if none is visible.
    async fn click_button(&mut self, label: &str) -> Result<bool, ScrapeError>;

    /// Rendered page source
    async fn content(&mut self) -> Result<String, ScrapeError>;

    /// Close the tab. Safe to call more than once.
    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Shared browsing context: locale, user agent, viewport and request filter are fixed
/// at creation. Workers may only open pages in it.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError>;

    /// Close every page and the context itself
    async fn close(&self) -> Result<(), ScrapeError>;
}

/// The browser process behind a context
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    async fn close(&self) -> Result<(), ScrapeError>;
}

/// Freshly launched browser: its process and the single context created in it
pub struct Launched {
    pub process: Box<dyn BrowserProcess>,
    pub context: Box<dyn BrowserContext>,
}

/// Starts browsers
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, browser: &BrowserSettings, scrape: &ScrapeConfig) -> Result<Launched, ScrapeError>;
}
