//! Remaining-ticket checker for OPENTIX event pages.
//!
//! [`crawler::FetchOrchestrator`] drives a headless browser over a batch of event URLs
//! and returns a [`crawler::BatchResult`] with one result or error per URL.

pub mod browser;
pub mod cli;
pub mod crawler;
pub mod error;
pub mod parser;
pub mod server;
pub mod utils;

pub use crawler::{scrape_many, BatchResult, FetchOrchestrator};
pub use error::ScrapeError;
