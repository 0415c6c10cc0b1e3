use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::driver::{BrowserLauncher, BrowserPage};
use crate::browser::popup::PopupDismisser;
use crate::browser::readiness::ReadinessDetector;
use crate::browser::session::BrowserSession;
use crate::browser::webdriver::WebDriverLauncher;
use crate::cli::config::AppConfig;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::target::{Target, TargetValidator};
use crate::crawler::task::{BatchResult, Outcome, PageResult, TargetError};
use crate::error::ScrapeError;
use crate::parser::{ListingParser, ParsedPage};

/// Runs batches of targets through one shared browser session.
pub struct FetchOrchestrator {
    config: AppConfig,
    launcher: Arc<dyn BrowserLauncher>,
    validator: TargetValidator,
    parser: ListingParser,
    readiness: ReadinessDetector,
    popup: PopupDismisser,
    retry: RetryPolicy,
}

impl FetchOrchestrator {
    /// Create an orchestrator backed by the WebDriver browser
    pub fn new(config: AppConfig) -> Result<Self, ScrapeError> {
        Self::with_launcher(config, Arc::new(WebDriverLauncher))
    }

    pub fn with_launcher(config: AppConfig, launcher: Arc<dyn BrowserLauncher>) -> Result<Self, ScrapeError> {
        config.validate()?;

        let parser = ListingParser::new(&config.site.selectors)?;
        let readiness = ReadinessDetector::new(&config.site.selectors.listing, &config.scrape);
        let popup = PopupDismisser::new(
            config.site.popup_labels.clone(),
            config.scrape.popup_click_timeout(),
        );
        let retry = RetryPolicy::new(config.scrape.max_retries, config.scrape.base_delay());
        let validator = TargetValidator::new(&config.site);

        Ok(Self {
            config,
            launcher,
            validator,
            parser,
            readiness,
            popup,
            retry,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Fetch every target and aggregate the outcomes.
    ///
    /// Per-target failures end up in `errors`; only a browser that cannot be started
    /// fails the whole batch.
    pub async fn scrape_many<S: AsRef<str>>(&self, targets: &[S]) -> Result<BatchResult, ScrapeError> {
        let span = info_span!("batch", id = %Uuid::new_v4());
        self.run_batch(targets).instrument(span).await
    }

    async fn run_batch<S: AsRef<str>>(&self, targets: &[S]) -> Result<BatchResult, ScrapeError> {
        let partition = self.validator.partition(targets);
        if partition.valid.is_empty() && partition.invalid.is_empty() {
            return Ok(BatchResult::no_targets());
        }

        info!(
            "Starting batch: {} valid, {} invalid targets",
            partition.valid.len(),
            partition.invalid.len()
        );

        let mut indexed: Vec<(usize, Outcome)> = partition
            .invalid
            .into_iter()
            .map(|target| {
                debug!("Skipping invalid target: {}", target.url);
                (
                    target.index,
                    Outcome::Failure(TargetError {
                        error: ScrapeError::InvalidTarget(target.url.clone()).to_string(),
                        url: target.url,
                    }),
                )
            })
            .collect();

        if !partition.valid.is_empty() {
            let session =
                BrowserSession::open(self.launcher.as_ref(), &self.config.browser, &self.config.scrape).await?;
            let gate = Semaphore::new(self.config.scrape.concurrency);

            let workers = partition
                .valid
                .iter()
                .map(|target| self.run_worker(&session, &gate, target));
            let outcomes = join_all(workers).await;

            session.close().await;
            indexed.extend(outcomes);
        }

        indexed.sort_by_key(|(index, _)| *index);
        let batch = BatchResult::from_outcomes(indexed.into_iter().map(|(_, outcome)| outcome).collect());

        info!(
            "Batch finished: {} total, {} succeeded, {} failed",
            batch.summary.total, batch.summary.success, batch.summary.failed
        );
        Ok(batch)
    }

    /// One target from first attempt to final outcome. Never fails.
    async fn run_worker(&self, session: &BrowserSession, gate: &Semaphore, target: &Target) -> (usize, Outcome) {
        let outcome = match self.fetch_with_retry(session, gate, &target.url).await {
            Ok((parsed, attempts)) => {
                info!("{}: {} session rows", target.url, parsed.entries.len());
                Outcome::Success(PageResult {
                    url: target.url.clone(),
                    title: parsed.title,
                    entries: parsed.entries,
                    success: true,
                    error: None,
                    attempts,
                    fetched_at: Utc::now(),
                })
            }
            Err(e) => {
                error!("{}: giving up: {}", target.url, e);
                Outcome::Failure(TargetError {
                    url: target.url.clone(),
                    error: e.to_string(),
                })
            }
        };
        (target.index, outcome)
    }

    /// Retry [`FetchOrchestrator::fetch_once`] with exponential backoff.
    pub async fn fetch_with_retry(
        &self,
        session: &BrowserSession,
        gate: &Semaphore,
        url: &str,
    ) -> Result<(ParsedPage, u32), ScrapeError> {
        self.retry
            .run(url, |_| self.fetch_once(session, gate, url))
            .await
    }

    /// A single attempt: open a tab, load, wait, dismiss popups, parse, close.
    async fn fetch_once(&self, session: &BrowserSession, gate: &Semaphore, url: &str) -> Result<ParsedPage, ScrapeError> {
        let _permit = gate
            .acquire()
            .await
            .map_err(|_| ScrapeError::transient("concurrency gate closed"))?;

        let mut page = session.new_page().await?;

        let result = match tokio::time::timeout(self.attempt_budget(), self.drive_page(page.as_mut(), url)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::transient(format!(
                "page attempt exceeded {}ms",
                self.attempt_budget().as_millis()
            ))),
        };

        if let Err(e) = page.close().await {
            warn!("Error closing page for {}: {}", url, e);
        }

        result
    }

    async fn drive_page(&self, page: &mut dyn BrowserPage, url: &str) -> Result<ParsedPage, ScrapeError> {
        let scrape = &self.config.scrape;

        page.goto(url, scrape.navigation_timeout()).await?;

        let readiness = self.readiness.wait(page).await;
        debug!("{}: ready via {:?}", url, readiness);

        let popup = self.popup.dismiss(page).await;
        debug!("{}: popup {:?}", url, popup);

        let html = match tokio::time::timeout(scrape.navigation_timeout(), page.content()).await {
            Ok(html) => html?,
            Err(_) => return Err(ScrapeError::transient("timed out reading page content")),
        };

        Ok(self.parser.parse_page(&html))
    }

    /// Worst case for one attempt when every stage runs to its timeout
    fn attempt_budget(&self) -> Duration {
        let scrape = &self.config.scrape;
        scrape.navigation_timeout() * 2
            + scrape.primary_wait_timeout()
            + scrape.network_idle_timeout()
            + scrape.grace_delay()
            + self.popup.budget()
    }
}

/// Scrape `targets` with a fresh WebDriver-backed orchestrator.
pub async fn scrape_many<S: AsRef<str>>(targets: &[S], config: AppConfig) -> Result<BatchResult, ScrapeError> {
    FetchOrchestrator::new(config)?.scrape_many(targets).await
}
