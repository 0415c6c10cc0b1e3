use std::time::Duration;
use tracing::debug;

use crate::browser::driver::BrowserPage;

/// Result of trying to get rid of consent and notice overlays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupOutcome {
    /// Clicked the button with this label
    Dismissed(String),
    /// No candidate was visible (or every click timed out)
    NoneFound,
}

/// Best-effort dismissal of overlays by clicking well-known button labels.
#[derive(Debug, Clone)]
pub struct PopupDismisser {
    labels: Vec<String>,
    click_timeout: Duration,
}

impl PopupDismisser {
    pub fn new(labels: Vec<String>, click_timeout: Duration) -> Self {
        Self {
            labels,
            click_timeout,
        }
    }

    /// Upper bound on the time [`PopupDismisser::dismiss`] can take
    pub fn budget(&self) -> Duration {
        self.click_timeout.saturating_mul(self.labels.len() as u32)
    }

    /// Click the first visible label in order. Errors are swallowed.
    pub async fn dismiss(&self, page: &mut dyn BrowserPage) -> PopupOutcome {
        for label in &self.labels {
            match tokio::time::timeout(self.click_timeout, page.click_button(label)).await {
                Ok(Ok(true)) => {
                    debug!("Dismissed popup via '{}'", label);
                    return PopupOutcome::Dismissed(label.clone());
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => debug!("Popup button '{}' not clickable: {}", label, e),
                Err(_) => debug!("Popup button '{}' timed out", label),
            }
        }
        PopupOutcome::NoneFound
    }
}
