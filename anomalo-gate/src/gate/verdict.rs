//! Pass/fail classification of a test run.

use super::VERIFY_STAGE;
use crate::context::StageInputs;
use crate::errors::GateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage data key under which the verify stage publishes its verdict.
pub const VERDICT_KEY: &str = "verdict";

/// Outcome of a remote validation test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The test reported `"passed"`.
    Passed,
    /// The test reported anything else.
    Failed,
}

impl Verdict {
    /// Classifies a results document by its `status` field.
    ///
    /// Only the exact string `"passed"` passes; any other value, including
    /// `null` or a different case, fails.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::MissingStatus`] if the field is absent.
    pub fn from_results(results: &serde_json::Value, test_id: u64) -> Result<Self, GateError> {
        match results.get("status") {
            None => Err(GateError::MissingStatus { test_id }),
            Some(status) if status.as_str() == Some("passed") => Ok(Self::Passed),
            Some(_) => Ok(Self::Failed),
        }
    }

    /// Reads the verdict published by the verify stage.
    ///
    /// # Errors
    ///
    /// Fails if the verify stage is not a declared dependency, or if it did
    /// not publish a well-formed verdict.
    pub fn from_inputs(inputs: &StageInputs) -> Result<Self, GateError> {
        let value = inputs.get_value(VERIFY_STAGE, VERDICT_KEY)?.ok_or_else(|| {
            GateError::StageExecution(format!(
                "No verdict from '{VERIFY_STAGE}' available to '{}'",
                inputs.stage_name()
            ))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Returns the wire name of the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Whether the test passed.
    #[must_use]
    pub const fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
