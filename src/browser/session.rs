use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, info};

use crate::browser::driver::{BrowserContext, BrowserLauncher, BrowserPage, BrowserProcess};
use crate::cli::config::{BrowserSettings, ScrapeConfig};
use crate::error::ScrapeError;

/// Browser session manager
///
/// Owns one browser process and the one context created in it for the length of a
/// batch. Workers share it by reference and can only open pages.
pub struct BrowserSession {
    /// Browser context shared by all pages
    context: Box<dyn BrowserContext>,

    /// Browser process; taken on close
    process: Mutex<Option<Box<dyn BrowserProcess>>>,

    closed: AtomicBool,
}

impl BrowserSession {
    /// Launch the browser and create its context
    pub async fn open(
        launcher: &dyn BrowserLauncher,
        browser: &BrowserSettings,
        scrape: &ScrapeConfig,
    ) -> Result<Self, ScrapeError> {
        if let Some(path) = &browser.binary_path {
            if !path.exists() {
                return Err(ScrapeError::SessionInit(format!(
                    "browser binary not found at {}",
                    path.display()
                )));
            }
        }

        let launched = launcher.launch(browser, scrape).await.map_err(|e| match e {
            ScrapeError::SessionInit(msg) => ScrapeError::SessionInit(msg),
            other => ScrapeError::SessionInit(other.to_string()),
        })?;

        info!(
            "Browser session opened ({}x{}, locale {})",
            scrape.viewport.width, scrape.viewport.height, browser.locale
        );

        Ok(Self {
            context: launched.context,
            process: Mutex::new(Some(launched.process)),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a new page in the shared context
    pub async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScrapeError::transient("browser session already closed"));
        }
        self.context.new_page().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the context, then the process.
    ///
    /// Errors are logged and swallowed. Calling this again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.context.close().await {
            error!("Error closing browser context: {}", e);
        }

        let process = match self.process.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(process) = process {
            if let Err(e) = process.close().await {
                error!("Error closing browser process: {}", e);
            }
        }

        debug!("Browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let process = match self.process.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(process) = process {
            // Only reached when close() was skipped, e.g. a cancelled batch
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = process.close().await {
                            error!("Error closing browser process during drop: {}", e);
                        }
                    });
                }
                Err(_) => error!("Browser session dropped outside a runtime; process left running"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use crate::browser::driver::{Launched, MockBrowserPage};

    #[derive(Default)]
    struct Calls {
        events: Mutex<Vec<&'static str>>,
        process_closes: AtomicUsize,
    }

    struct FakeContext(Arc<Calls>);
    struct FakeProcess(Arc<Calls>);
    struct FakeLauncher {
        calls: Arc<Calls>,
        fail: bool,
    }

    #[async_trait]
    impl BrowserContext for FakeContext {
        async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
            Ok(Box::new(MockBrowserPage::new()))
        }

        async fn close(&self) -> Result<(), ScrapeError> {
            self.0.events.lock().unwrap().push("context");
            Err(ScrapeError::transient("context already gone"))
        }
    }

    #[async_trait]
    impl BrowserProcess for FakeProcess {
        async fn close(&self) -> Result<(), ScrapeError> {
            self.0.events.lock().unwrap().push("process");
            self.0.process_closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self, _: &BrowserSettings, _: &ScrapeConfig) -> Result<Launched, ScrapeError> {
            if self.fail {
                return Err(ScrapeError::transient("connection refused"));
            }
            Ok(Launched {
                process: Box::new(FakeProcess(self.calls.clone())),
                context: Box::new(FakeContext(self.calls.clone())),
            })
        }
    }

    #[tokio::test]
    async fn test_close_order_and_idempotence() {
        let calls = Arc::new(Calls::default());
        let launcher = FakeLauncher { calls: calls.clone(), fail: false };
        let session = BrowserSession::open(&launcher, &BrowserSettings::default(), &ScrapeConfig::default())
            .await
            .unwrap();

        assert!(session.new_page().await.is_ok());

        session.close().await;
        session.close().await;
        drop(session);

        assert_eq!(*calls.events.lock().unwrap(), vec!["context", "process"]);
        assert_eq!(calls.process_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_page_after_close_fails() {
        let calls = Arc::new(Calls::default());
        let launcher = FakeLauncher { calls, fail: false };
        let session = BrowserSession::open(&launcher, &BrowserSettings::default(), &ScrapeConfig::default())
            .await
            .unwrap();

        session.close().await;
        assert!(session.is_closed());
        assert!(session.new_page().await.is_err());
    }

    #[tokio::test]
    async fn test_launch_failure_is_session_init() {
        let launcher = FakeLauncher { calls: Arc::new(Calls::default()), fail: true };
        let result = BrowserSession::open(&launcher, &BrowserSettings::default(), &ScrapeConfig::default()).await;
        assert!(matches!(result, Err(ScrapeError::SessionInit(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_session_init() {
        let launcher = FakeLauncher { calls: Arc::new(Calls::default()), fail: false };
        let settings = BrowserSettings {
            binary_path: Some("/nonexistent/ticketwatch/chrome".into()),
            ..BrowserSettings::default()
        };
        let result = BrowserSession::open(&launcher, &settings, &ScrapeConfig::default()).await;
        assert!(matches!(result, Err(ScrapeError::SessionInit(_))));
    }
}
