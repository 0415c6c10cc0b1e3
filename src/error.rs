use std::time::Duration;
use thiserror::Error;

/// Errors produced by the scraping core.
///
/// Only [`ScrapeError::SessionInit`] and [`ScrapeError::Config`] ever escape a batch;
/// everything else is folded into a per-target error record.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Malformed or off-site URL. Never attempted.
    #[error("invalid URL format")]
    InvalidTarget(String),

    /// The page did not reach DOM-ready within the navigation timeout.
    #[error("navigation to {url} timed out after {}ms", .timeout.as_millis())]
    NavigationTimeout { url: String, timeout: Duration },

    /// Any other failure while driving a page. Retryable.
    #[error("{0}")]
    TransientFetch(String),

    /// Every attempt failed; carries the last attempt's error.
    #[error("{kind}: {message} (after {attempts} attempts)")]
    ExhaustedRetries {
        attempts: u32,
        kind: &'static str,
        message: String,
    },

    /// The browser or its context could not be started.
    #[error("browser session could not be started: {0}")]
    SessionInit(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Short name of the error class, used in per-target error strings.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::InvalidTarget(_) => "InvalidTarget",
            ScrapeError::NavigationTimeout { .. } => "NavigationTimeout",
            ScrapeError::TransientFetch(_) => "TransientFetchError",
            ScrapeError::ExhaustedRetries { .. } => "ExhaustedRetries",
            ScrapeError::SessionInit(_) => "SessionInitError",
            ScrapeError::Config(_) => "ConfigError",
        }
    }

    /// Whether another attempt at the same target may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::NavigationTimeout { .. } | ScrapeError::TransientFetch(_)
        )
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        ScrapeError::TransientFetch(err.to_string())
    }
}

impl From<thirtyfour::error::WebDriverError> for ScrapeError {
    fn from(err: thirtyfour::error::WebDriverError) -> Self {
        ScrapeError::TransientFetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(ScrapeError::transient("detached frame").is_retryable());
        assert!(ScrapeError::NavigationTimeout {
            url: "https://www.opentix.life/event/1".to_string(),
            timeout: Duration::from_secs(90),
        }
        .is_retryable());
        assert!(!ScrapeError::InvalidTarget("x".to_string()).is_retryable());
        assert!(!ScrapeError::SessionInit("no driver".to_string()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ScrapeError::NavigationTimeout {
            url: "https://www.opentix.life/event/1".to_string(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "navigation to https://www.opentix.life/event/1 timed out after 1500ms"
        );
        assert_eq!(
            ScrapeError::InvalidTarget("nope".to_string()).to_string(),
            "invalid URL format"
        );
    }
}
