//! WebDriver-backed browser, one session per batch and one tab per page.
//!
//! All tabs share a single WebDriver session, which only has one focused window at
//! a time. Each command therefore locks the driver, focuses its tab, runs, and
//! releases the lock again. The session uses the `none` page-load strategy, so
//! chromedriver never blocks a command on a loading tab; navigation is started from
//! script and its progress polled, which keeps tabs loading concurrently.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::fantoccini::error::CmdError;
use thirtyfour::{CapabilitiesHelper, ChromeCapabilities, PageLoadStrategy, WindowHandle};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::browser::driver::{BrowserContext, BrowserLauncher, BrowserPage, BrowserProcess, Launched};
use crate::cli::config::{BrowserSettings, ScrapeConfig};
use crate::error::ScrapeError;

const START_NAVIGATION: &str = "window.location.assign(arguments[0]); return true;";

const DOCUMENT_STATE: &str = "return [document.readyState, window.location.href];";

const NETWORK_STATE: &str =
    "return [document.readyState, performance.getEntriesByType('resource').length];";

const CLICK_BUTTON: &str = r#"
const label = arguments[0];
const candidates = document.querySelectorAll('button, [role="button"], .btn');
for (const el of candidates) {
    const text = (el.innerText || el.textContent || '').trim();
    const aria = (el.getAttribute('aria-label') || '').trim();
    if (text !== label && aria !== label) continue;
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    if (rect.width === 0 || rect.height === 0) continue;
    if (style.visibility === 'hidden' || style.display === 'none') continue;
    el.click();
    return true;
}
return false;
"#;

const SELECTOR_PRESENT: &str = "return document.querySelector(arguments[0]) !== null;";

/// State shared by the process, the context and every tab
struct Shared {
    driver: Mutex<Option<WebDriver>>,
    /// Tab the session started with; kept open so the session survives page closes
    main_window: WindowHandle,
    browser: BrowserSettings,
    poll_interval: Duration,
}

const SESSION_CLOSED: &str = "browser session already closed";

fn closed_error() -> ScrapeError {
    ScrapeError::transient(SESSION_CLOSED)
}

/// Whether chromedriver gave up waiting for a page to load
fn is_page_load_timeout(err: &WebDriverError) -> bool {
    match err {
        WebDriverError::Timeout(_) => true,
        WebDriverError::CmdError(CmdError::Standard(e)) => e.error() == "timeout",
        _ => false,
    }
}

/// Classify a driver error raised while navigating to `url`
fn navigation_error(err: WebDriverError, url: &str, timeout: Duration) -> ScrapeError {
    if is_page_load_timeout(&err) {
        ScrapeError::NavigationTimeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        err.into()
    }
}

impl Shared {
    async fn script(&self, handle: &WindowHandle, script: &str, args: Vec<Value>) -> WebDriverResult<Value> {
        let guard = self.driver.lock().await;
        let driver = guard
            .as_ref()
            .ok_or_else(|| WebDriverError::CustomError(SESSION_CLOSED.to_string()))?;
        driver.switch_to_window(handle.clone()).await?;
        let ret = driver.execute(script, args).await?;
        Ok(ret.json().clone())
    }

    async fn source(&self, handle: &WindowHandle) -> Result<String, ScrapeError> {
        let guard = self.driver.lock().await;
        let driver = guard.as_ref().ok_or_else(closed_error)?;
        driver.switch_to_window(handle.clone()).await?;
        Ok(driver.source().await?)
    }

    /// Close one tab; a session that is already gone counts as closed
    async fn close_tab(&self, handle: &WindowHandle) -> Result<(), ScrapeError> {
        let guard = self.driver.lock().await;
        let driver = match guard.as_ref() {
            Some(driver) => driver,
            None => return Ok(()),
        };
        driver.switch_to_window(handle.clone()).await?;
        driver.close_window().await?;
        driver.switch_to_window(self.main_window.clone()).await?;
        Ok(())
    }
}

/// Apply the context-wide request filter and headers to the focused tab
async fn apply_tab_settings(driver: &WebDriver, browser: &BrowserSettings) -> Result<(), ScrapeError> {
    let dev_tools = ChromeDevTools::new(driver.handle.clone());
    dev_tools.execute_cdp("Network.enable").await?;

    if !browser.blocked_resource_patterns.is_empty() {
        dev_tools
            .execute_cdp_with_params(
                "Network.setBlockedURLs",
                json!({ "urls": browser.blocked_resource_patterns }),
            )
            .await?;
    }

    if !browser.extra_headers.is_empty() {
        dev_tools
            .execute_cdp_with_params(
                "Network.setExtraHTTPHeaders",
                json!({ "headers": browser.extra_headers }),
            )
            .await?;
    }

    Ok(())
}

/// Launches Chrome through a WebDriver server (chromedriver or a Selenium grid)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebDriverLauncher;

impl WebDriverLauncher {
    fn capabilities(browser: &BrowserSettings, scrape: &ScrapeConfig) -> WebDriverResult<ChromeCapabilities> {
        let mut caps = DesiredCapabilities::chrome();

        if browser.headless {
            caps.set_headless()?;
        }

        // Commands return without waiting for loads; `goto` polls instead
        caps.add("pageLoadStrategy", PageLoadStrategy::None)?;

        // Containers rarely allow the Chrome sandbox
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--ignore-certificate-errors")?;
        caps.add_chrome_arg(&format!("--user-agent={}", browser.user_agent))?;
        caps.add_chrome_arg(&format!("--lang={}", browser.locale))?;
        caps.add_chrome_arg(&format!(
            "--window-size={},{}",
            scrape.viewport.width, scrape.viewport.height
        ))?;

        let accept_language = browser
            .extra_headers
            .get("Accept-Language")
            .cloned()
            .unwrap_or_else(|| browser.locale.clone());
        caps.add_chrome_option(
            "prefs",
            json!({
                "intl.accept_languages": accept_language,
                "profile.managed_default_content_settings.images": 2,
            }),
        )?;

        if let Some(binary) = &browser.binary_path {
            caps.set_binary(&binary.to_string_lossy())?;
        }

        Ok(caps)
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, browser: &BrowserSettings, scrape: &ScrapeConfig) -> Result<Launched, ScrapeError> {
        let caps = Self::capabilities(browser, scrape)
            .map_err(|e| ScrapeError::SessionInit(format!("invalid browser capabilities: {}", e)))?;

        let driver = WebDriver::new(&browser.webdriver_url, caps).await.map_err(|e| {
            ScrapeError::SessionInit(format!(
                "failed to connect to WebDriver at {}: {}",
                browser.webdriver_url, e
            ))
        })?;

        let setup = async {
            driver.set_page_load_timeout(scrape.navigation_timeout()).await?;
            let main_window = driver.window().await?;
            apply_tab_settings(&driver, browser).await?;
            Ok::<_, ScrapeError>(main_window)
        }
        .await;

        let main_window = match setup {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(quit_err) = driver.quit().await {
                    error!("Error closing browser after failed setup: {}", quit_err);
                }
                return Err(ScrapeError::SessionInit(e.to_string()));
            }
        };

        debug!("WebDriver session started at {}", browser.webdriver_url);

        let shared = Arc::new(Shared {
            driver: Mutex::new(Some(driver)),
            main_window,
            browser: browser.clone(),
            poll_interval: scrape.poll_interval(),
        });

        Ok(Launched {
            process: Box::new(WebDriverProcess(shared.clone())),
            context: Box::new(WebDriverContext(shared)),
        })
    }
}

struct WebDriverProcess(Arc<Shared>);

#[async_trait]
impl BrowserProcess for WebDriverProcess {
    async fn close(&self) -> Result<(), ScrapeError> {
        let driver = self.0.driver.lock().await.take();
        if let Some(driver) = driver {
            driver.quit().await?;
        }
        Ok(())
    }
}

struct WebDriverContext(Arc<Shared>);

#[async_trait]
impl BrowserContext for WebDriverContext {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        let guard = self.0.driver.lock().await;
        let driver = guard.as_ref().ok_or_else(closed_error)?;
        let handle = driver.new_tab().await?;
        driver.switch_to_window(handle.clone()).await?;
        apply_tab_settings(driver, &self.0.browser).await?;
        drop(guard);

        Ok(Box::new(WebDriverPage {
            shared: self.0.clone(),
            handle,
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        let guard = self.0.driver.lock().await;
        let driver = match guard.as_ref() {
            Some(driver) => driver,
            None => return Ok(()),
        };
        for handle in driver.windows().await? {
            if handle != self.0.main_window {
                driver.switch_to_window(handle).await?;
                driver.close_window().await?;
            }
        }
        driver.switch_to_window(self.0.main_window.clone()).await?;
        Ok(())
    }
}

/// One tab in the shared WebDriver session
struct WebDriverPage {
    shared: Arc<Shared>,
    handle: WindowHandle,
    closed: bool,
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        let deadline = Instant::now() + timeout;
        self.shared
            .script(&self.handle, START_NAVIGATION, vec![json!(url)])
            .await
            .map_err(|e| navigation_error(e, url, timeout))?;

        loop {
            let state = self
                .shared
                .script(&self.handle, DOCUMENT_STATE, Vec::new())
                .await
                .map_err(|e| navigation_error(e, url, timeout))?;
            let ready_state = state[0].as_str().unwrap_or_default();
            let href = state[1].as_str().unwrap_or_default();

            if href.starts_with("chrome-error://") {
                return Err(ScrapeError::transient(format!("browser could not load {}", url)));
            }
            if href != "about:blank" && matches!(ready_state, "interactive" | "complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.shared.poll_interval).await;
        }
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool, ScrapeError> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self
                .shared
                .script(&self.handle, SELECTOR_PRESENT, vec![json!(selector)])
                .await?;
            if found.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.shared.poll_interval).await;
        }
    }

    async fn wait_for_network_idle(&mut self, quiet: Duration, timeout: Duration) -> Result<bool, ScrapeError> {
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let state = self.shared.script(&self.handle, NETWORK_STATE, Vec::new()).await?;
            let complete = state[0].as_str() == Some("complete");
            let count = state[1].as_u64();

            let now = Instant::now();
            if count != last_count {
                last_count = count;
                quiet_since = now;
            }
            if complete && now.duration_since(quiet_since) >= quiet {
                return Ok(true);
            }
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.shared.poll_interval).await;
        }
    }

    async fn click_button(&mut self, label: &str) -> Result<bool, ScrapeError> {
        let clicked = self
            .shared
            .script(&self.handle, CLICK_BUTTON, vec![json!(label)])
            .await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    async fn content(&mut self) -> Result<String, ScrapeError> {
        self.shared.source(&self.handle).await
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared.close_tab(&self.handle).await
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let shared = self.shared.clone();
        let handle = self.handle.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = shared.close_tab(&handle).await {
                    error!("Error closing tab during drop: {}", e);
                }
            });
        }
    }
}
