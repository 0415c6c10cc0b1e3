pub mod controller;
pub mod retry;
pub mod target;
pub mod task;

// Re-export common types
pub use controller::{scrape_many, FetchOrchestrator};
pub use retry::{RetryPolicy, RetryState};
pub use target::{split_targets, Target, TargetValidator};
pub use task::{BatchError, BatchResult, PageResult, SessionEntry, Summary, TargetError};
