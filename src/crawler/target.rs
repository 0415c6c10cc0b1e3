use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::cli::config::SiteSettings;

/// A target that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Position in the caller's input, used to keep output order stable
    pub index: usize,
    /// The URL as the caller sent it, trimmed
    pub url: String,
}

/// Targets split by structural validity
#[derive(Debug, Default)]
pub struct Partition {
    pub valid: Vec<Target>,
    pub invalid: Vec<Target>,
}

/// Decides which URLs are OPENTIX event pages
pub struct TargetValidator {
    /// Allowed domains for scraping
    allowed_domains: HashSet<String>,

    event_path_marker: String,
}

impl TargetValidator {
    pub fn new(site: &SiteSettings) -> Self {
        let allowed_domains = site
            .allowed_domains
            .iter()
            .map(|domain| domain.trim().to_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();

        Self {
            allowed_domains,
            event_path_marker: site.event_path_marker.clone(),
        }
    }

    /// Whether `url` is an http(s) URL on an allowed domain with an event path
    pub fn is_valid(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Rejecting unparseable URL {}: {}", url, e);
                return false;
            }
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            debug!("Rejecting URL with scheme {}: {}", parsed.scheme(), url);
            return false;
        }

        let host = match parsed.host_str() {
            Some(host) => host.to_lowercase(),
            None => {
                debug!("Rejecting URL without host: {}", url);
                return false;
            }
        };

        // Subdomains of an allowed domain count as allowed
        if !self
            .allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
        {
            debug!("Rejecting URL from non-allowed domain: {}", host);
            return false;
        }

        if !parsed.path().contains(&self.event_path_marker) {
            debug!("Rejecting URL without event path: {}", url);
            return false;
        }

        true
    }

    /// Trim, drop empty entries and split the rest by validity.
    ///
    /// Duplicates are kept; each one is fetched on its own.
    pub fn partition<S: AsRef<str>>(&self, raw: &[S]) -> Partition {
        let mut partition = Partition::default();

        let trimmed = raw
            .iter()
            .map(|url| url.as_ref().trim())
            .filter(|url| !url.is_empty());

        for (index, url) in trimmed.enumerate() {
            let target = Target {
                index,
                url: url.to_string(),
            };
            if self.is_valid(url) {
                partition.valid.push(target);
            } else {
                partition.invalid.push(target);
            }
        }

        partition
    }
}

/// Split comma-separated target lists the way the `urls` query parameter is sent.
pub fn split_targets<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|item| item.as_ref().split(','))
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TargetValidator {
        TargetValidator::new(&SiteSettings::default())
    }

    #[test]
    fn test_is_valid() {
        let v = validator();

        assert!(v.is_valid("https://www.opentix.life/event/1865473210123456789"));
        assert!(v.is_valid("http://opentix.life/event/A"));
        assert!(v.is_valid("https://WWW.OPENTIX.LIFE/event/A?x=1"));

        assert!(!v.is_valid("not-a-url"));
        assert!(!v.is_valid("ftp://www.opentix.life/event/A"));
        assert!(!v.is_valid("https://www.example.com/event/A"));
        assert!(!v.is_valid("https://notopentix.life/event/A"));
        assert!(!v.is_valid("https://www.opentix.life/program/A"));
    }

    #[test]
    fn test_partition_keeps_order_and_duplicates() {
        let v = validator();
        let raw = vec![
            " https://www.opentix.life/event/A ",
            "",
            "not-a-url",
            "https://www.opentix.life/event/A",
            "   ",
        ];
        let partition = v.partition(&raw);

        assert_eq!(partition.valid.len(), 2);
        assert_eq!(partition.valid[0].index, 0);
        assert_eq!(partition.valid[0].url, "https://www.opentix.life/event/A");
        assert_eq!(partition.valid[1].index, 2);
        assert_eq!(partition.invalid, vec![Target { index: 1, url: "not-a-url".to_string() }]);
    }

    #[test]
    fn test_split_targets() {
        let raw = ["https://www.opentix.life/event/A,not-a-url, https://www.opentix.life/event/B", ","];
        assert_eq!(
            split_targets(&raw),
            vec![
                "https://www.opentix.life/event/A".to_string(),
                "not-a-url".to_string(),
                "https://www.opentix.life/event/B".to_string(),
            ]
        );
    }
}
