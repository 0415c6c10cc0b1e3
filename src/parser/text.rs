//! Digit normalization and remaining-count extraction.
//!
//! OPENTIX mixes full-width and half-width digits freely, e.g. `剩：９１` next to
//! `剩：91`. Everything is normalized to half-width before matching.

use once_cell::sync::Lazy;
use regex::Regex;

/// A digit run that may carry thousands separators but never starts or ends with one.
const DIGITS: &str = r"([0-9](?:[0-9,]*[0-9])?)";

/// Ordered extraction patterns; the first one that matches wins.
static REMAINING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"剩\s*[:：]\s*{DIGITS}"),
        format!(r"餘\s*[:：]\s*{DIGITS}"),
        format!(r"還剩\s*{DIGITS}"),
        format!(r"{DIGITS}\s*張?\s*剩"),
        DIGITS.to_string(),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("remaining-count pattern is valid"))
    .collect()
});

/// Map full-width digits (U+FF10..=U+FF19) and the full-width comma to ASCII.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF10}'..='\u{FF19}' => {
                char::from_u32(c as u32 - 0xFF10 + '0' as u32).unwrap_or(c)
            }
            '\u{FF0C}' => ',',
            other => other,
        })
        .collect()
}

/// Pull the remaining-ticket count out of free text such as `剩：910`.
///
/// Returns `None` for empty input or when no pattern matches.
pub fn extract_remaining_count(text: &str) -> Option<String> {
    let normalized = normalize_digits(text.trim());
    if normalized.is_empty() {
        return None;
    }

    REMAINING_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(&normalized))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_digits() {
        assert_eq!(normalize_digits("０１２３４５６７８９"), "0123456789");
        assert_eq!(normalize_digits("１，２３４"), "1,234");
        assert_eq!(normalize_digits("剩：９１ 張"), "剩：91 張");
        assert_eq!(normalize_digits(""), "");
    }

    #[test]
    fn test_normalize_digits_is_idempotent() {
        for s in ["剩：９１０", "abc", "1,2３,４", "（五）19:30", "ａｂｃ０"] {
            let once = normalize_digits(s);
            assert_eq!(normalize_digits(&once), once);
        }
    }

    #[test]
    fn test_extract_remaining_count() {
        assert_eq!(extract_remaining_count("剩：910"), Some("910".to_string()));
        assert_eq!(extract_remaining_count("剩：９１０"), Some("910".to_string()));
        assert_eq!(extract_remaining_count("no digits here"), None);
        assert_eq!(extract_remaining_count(""), None);
        assert_eq!(extract_remaining_count("   "), None);
    }

    #[test]
    fn test_extract_pattern_order() {
        assert_eq!(extract_remaining_count("剩:12"), Some("12".to_string()));
        assert_eq!(extract_remaining_count("餘：7"), Some("7".to_string()));
        assert_eq!(extract_remaining_count("還剩 45 張"), Some("45".to_string()));
        assert_eq!(extract_remaining_count("30張剩"), Some("30".to_string()));
        // A labelled count wins over an earlier bare number.
        assert_eq!(
            extract_remaining_count("2025 場次 剩：88"),
            Some("88".to_string())
        );
        assert_eq!(extract_remaining_count("約 300 席"), Some("300".to_string()));
    }

    #[test]
    fn test_extract_keeps_internal_commas() {
        assert_eq!(extract_remaining_count("剩：1,234"), Some("1,234".to_string()));
        assert_eq!(extract_remaining_count("剩：１，２３４，"), Some("1,234".to_string()));
    }

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("  2025/8/29 (五)\n  19:30 "), "2025/8/29 (五) 19:30");
        assert_eq!(squash_whitespace("\n\t"), "");
    }
}
