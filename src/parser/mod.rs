pub mod listing;
pub mod text;

// Re-export common types
pub use listing::{ListingParser, ParsedPage};
pub use text::{extract_remaining_count, normalize_digits};
