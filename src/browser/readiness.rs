use std::time::Duration;
use tracing::debug;

use crate::browser::driver::BrowserPage;
use crate::cli::config::ScrapeConfig;

/// Which stage decided the page was ready to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The listing container appeared
    PrimaryContent,
    /// The network went quiet
    NetworkIdle,
    /// Neither signal arrived; parsed after the grace delay anyway
    GraceDelay,
}

/// Staged wait for a slow single-page app to finish rendering.
///
/// Never fails: a page that never renders is discovered by the parser finding
/// no rows.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    listing_selector: String,
    primary_timeout: Duration,
    network_quiet: Duration,
    network_timeout: Duration,
    grace_delay: Duration,
}

impl ReadinessDetector {
    pub fn new(listing_selector: &str, config: &ScrapeConfig) -> Self {
        Self {
            listing_selector: listing_selector.to_string(),
            primary_timeout: config.primary_wait_timeout(),
            network_quiet: config.network_quiet(),
            network_timeout: config.network_idle_timeout(),
            grace_delay: config.grace_delay(),
        }
    }

    pub async fn wait(&self, page: &mut dyn BrowserPage) -> Readiness {
        match page
            .wait_for_selector(&self.listing_selector, self.primary_timeout)
            .await
        {
            Ok(true) => return Readiness::PrimaryContent,
            Ok(false) => debug!("Listing did not appear within {:?}", self.primary_timeout),
            Err(e) => debug!("Listing wait failed: {}", e),
        }

        match page
            .wait_for_network_idle(self.network_quiet, self.network_timeout)
            .await
        {
            Ok(true) => return Readiness::NetworkIdle,
            Ok(false) => debug!("Network stayed busy for {:?}", self.network_timeout),
            Err(e) => debug!("Network idle wait failed: {}", e),
        }

        tokio::time::sleep(self.grace_delay).await;
        Readiness::GraceDelay
    }
}
