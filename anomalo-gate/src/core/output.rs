//! Stage output type with factory methods.

use super::StageStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of a stage execution.
///
/// `StageOutput` is immutable once created; use the factory methods to
/// build outputs with different statuses. Downstream stages see only the
/// `data` map, through their declared inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// The output data (for successful executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Skip reason (for skipped executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// Cancel reason (for cancelled executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Default for StageOutput {
    fn default() -> Self {
        Self::ok_empty()
    }
}

impl StageOutput {
    fn with_status(status: StageStatus) -> Self {
        Self {
            status,
            data: None,
            metadata: HashMap::new(),
            error: None,
            skip_reason: None,
            cancel_reason: None,
        }
    }

    /// Creates a successful output with data.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: Some(data),
            ..Self::with_status(StageStatus::Ok)
        }
    }

    /// Creates a successful output with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::with_status(StageStatus::Ok)
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a skip output with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::with_status(StageStatus::Skip)
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            ..Self::with_status(StageStatus::Cancel)
        }
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(StageStatus::Fail)
        }
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the output indicates failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the data, or an empty map if none.
    #[must_use]
    pub fn data_or_empty(&self) -> HashMap<String, serde_json::Value> {
        self.data.clone().unwrap_or_default()
    }

    /// Gets a value from the data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ok_output() {
        let mut data = HashMap::new();
        data.insert("result".to_string(), serde_json::json!("success"));

        let output = StageOutput::ok(data);
        assert_eq!(output.status, StageStatus::Ok);
        assert!(output.is_success());
        assert!(!output.is_failure());
    }

    #[test]
    fn test_ok_empty() {
        let output = StageOutput::ok_empty();
        assert_eq!(output.status, StageStatus::Ok);
        assert!(output.data.is_none());
        assert!(output.data_or_empty().is_empty());
    }

    #[test]
    fn test_ok_value() {
        let output = StageOutput::ok_value("key", serde_json::json!("value"));
        assert_eq!(output.get("key"), Some(&serde_json::json!("value")));
    }

    #[test]
    fn test_skip_output() {
        let output = StageOutput::skip("Not needed");
        assert_eq!(output.status, StageStatus::Skip);
        assert_eq!(output.skip_reason, Some("Not needed".to_string()));
        assert!(output.is_success());
    }

    #[test]
    fn test_cancel_output() {
        let output = StageOutput::cancel("User requested");
        assert_eq!(output.cancel_reason, Some("User requested".to_string()));
        assert!(output.is_failure());
    }

    #[test]
    fn test_fail_output() {
        let output = StageOutput::fail("Something went wrong");
        assert_eq!(output.status, StageStatus::Fail);
        assert_eq!(output.error, Some("Something went wrong".to_string()));
        assert!(output.is_failure());
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let output = StageOutput::fail("error").add_metadata("http_status", serde_json::json!(500));
        let json = serde_json::to_value(&output).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "status": "fail",
                "error": "error",
                "metadata": {"http_status": 500},
            })
        );
    }
}
