pub mod driver;
pub mod popup;
pub mod readiness;
pub mod session;
pub mod webdriver;

// Re-export common types
pub use driver::{BrowserContext, BrowserLauncher, BrowserPage, BrowserProcess, Launched};
pub use popup::{PopupDismisser, PopupOutcome};
pub use readiness::{Readiness, ReadinessDetector};
pub use session::BrowserSession;
pub use webdriver::WebDriverLauncher;
