//! Run identity for tracking gate executions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline run and the remote test it gates.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunIdentity {
    /// The unique ID for this pipeline run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_run_id: Option<Uuid>,

    /// The remote test being gated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<u64>,
}

impl RunIdentity {
    /// Creates a new run identity with a generated pipeline run ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline_run_id: Some(Uuid::new_v4()),
            test_id: None,
        }
    }

    /// Sets the gated test id.
    #[must_use]
    pub fn for_test(mut self, test_id: u64) -> Self {
        self.test_id = Some(test_id);
        self
    }
}
