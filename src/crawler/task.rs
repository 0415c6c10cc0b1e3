use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability of one performance on an event page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Date and description joined; `None` when both are empty
    pub label: Option<String>,

    /// Normalized remaining count (e.g. "1,204"), `None` if it could not be parsed
    pub remaining: Option<String>,

    /// Remaining-count text exactly as shown on the page
    pub raw_remaining_text: String,

    pub date: String,

    pub description: String,
}

/// Outcome of fetching one target successfully
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,

    pub title: Option<String>,

    /// Session rows in page order; empty means "not detected"
    pub entries: Vec<SessionEntry>,

    pub success: bool,

    pub error: Option<String>,

    /// Attempts it took, including the successful one
    pub attempts: u32,

    pub fetched_at: DateTime<Utc>,
}

/// A target that produced no result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetError {
    pub url: String,
    pub error: String,
}

/// One entry of [`BatchResult::errors`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchError {
    Target(TargetError),
    /// Batch-level message not tied to a URL
    Message(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Aggregate of one batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<PageResult>,
    pub errors: Vec<BatchError>,
    pub summary: Summary,
}

/// What happened to one target
#[derive(Debug)]
pub(crate) enum Outcome {
    Success(PageResult),
    Failure(TargetError),
}

impl BatchError {
    pub fn url(&self) -> Option<&str> {
        match self {
            BatchError::Target(e) => Some(&e.url),
            BatchError::Message(_) => None,
        }
    }
}

impl BatchResult {
    /// Result for a batch that had nothing to process
    pub fn no_targets() -> Self {
        Self {
            results: Vec::new(),
            errors: vec![BatchError::Message("no url provided".to_string())],
            summary: Summary::default(),
        }
    }

    /// Assemble from outcomes already ordered by input position.
    pub(crate) fn from_outcomes(outcomes: Vec<Outcome>) -> Self {
        let total = outcomes.len();
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for outcome in outcomes {
            match outcome {
                Outcome::Success(page) => results.push(page),
                Outcome::Failure(err) => errors.push(BatchError::Target(err)),
            }
        }

        let summary = Summary {
            total,
            success: results.len(),
            failed: errors.len(),
        };

        Self {
            results,
            errors,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_errors_serialize_as_object_or_string() {
        let errors = vec![
            BatchError::Target(TargetError {
                url: "not-a-url".to_string(),
                error: "invalid URL format".to_string(),
            }),
            BatchError::Message("no url provided".to_string()),
        ];
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!([{"url": "not-a-url", "error": "invalid URL format"}, "no url provided"])
        );
    }

    #[test]
    fn test_no_targets_shape() {
        let value = serde_json::to_value(BatchResult::no_targets()).unwrap();
        assert_eq!(
            value,
            json!({
                "results": [],
                "errors": ["no url provided"],
                "summary": {"total": 0, "success": 0, "failed": 0}
            })
        );
    }

    #[test]
    fn test_from_outcomes_counts() {
        let outcomes = vec![
            Outcome::Failure(TargetError {
                url: "a".to_string(),
                error: "x".to_string(),
            }),
            Outcome::Success(PageResult {
                url: "b".to_string(),
                title: None,
                entries: Vec::new(),
                success: true,
                error: None,
                attempts: 1,
                fetched_at: Utc::now(),
            }),
        ];
        let batch = BatchResult::from_outcomes(outcomes);
        assert_eq!(batch.summary, Summary { total: 2, success: 1, failed: 1 });
        assert_eq!(batch.results[0].url, "b");
        assert_eq!(batch.errors[0].url(), Some("a"));
    }
}
