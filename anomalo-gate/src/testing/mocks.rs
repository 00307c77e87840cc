//! Mock stages and collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::client::{ApiResponse, TestRunApi};
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::GateError;
use crate::gate::{NextStageTrigger, RecordMover};
use crate::stages::Stage;

/// A stage that always succeeds with optional data.
#[derive(Debug)]
pub struct SuccessStage {
    name: String,
    data: HashMap<String, serde_json::Value>,
}

impl SuccessStage {
    /// Creates a new success stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: HashMap::new(),
        }
    }

    /// Creates a success stage that emits a single value.
    #[must_use]
    pub fn with_value(
        name: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            data: HashMap::from([(key.into(), value)]),
        }
    }
}

#[async_trait]
impl Stage for SuccessStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        if self.data.is_empty() {
            StageOutput::ok_empty()
        } else {
            StageOutput::ok(self.data.clone())
        }
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::fail(&self.error)
    }
}

/// In-memory test service returning canned responses and recording calls.
#[derive(Debug)]
pub struct MockTestRunApi {
    run_response: ApiResponse,
    results_response: ApiResponse,
    calls: Mutex<Vec<(&'static str, u64)>>,
}

impl MockTestRunApi {
    /// Creates a mock with explicit responses for both endpoints.
    #[must_use]
    pub fn new(run_response: ApiResponse, results_response: ApiResponse) -> Self {
        Self {
            run_response,
            results_response,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock whose run succeeds and whose results report `status`.
    #[must_use]
    pub fn with_status(status: &str) -> Self {
        Self::new(
            ApiResponse::new(200, r#"{"run_id": 1, "state": "queued"}"#),
            ApiResponse::new(200, serde_json::json!({ "status": status }).to_string()),
        )
    }

    /// Returns the endpoints called, in order, with the test id used.
    #[must_use]
    pub fn calls(&self) -> Vec<(&'static str, u64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TestRunApi for MockTestRunApi {
    async fn run_test(&self, test_id: u64) -> Result<ApiResponse, GateError> {
        self.calls.lock().push(("run", test_id));
        Ok(self.run_response.clone())
    }

    async fn fetch_results(&self, test_id: u64) -> Result<ApiResponse, GateError> {
        self.calls.lock().push(("results", test_id));
        Ok(self.results_response.clone())
    }
}

/// Record mover that remembers every destination it was asked to use.
#[derive(Debug, Default)]
pub struct RecordingRecordMover {
    moves: Mutex<Vec<(String, u64)>>,
}

impl RecordingRecordMover {
    /// Creates a new recording mover.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded `(destination, test_id)` pairs.
    #[must_use]
    pub fn moves(&self) -> Vec<(String, u64)> {
        self.moves.lock().clone()
    }
}

#[async_trait]
impl RecordMover for RecordingRecordMover {
    async fn move_bad_records(&self, destination: &str, test_id: u64) -> Result<(), GateError> {
        self.moves.lock().push((destination.to_string(), test_id));
        Ok(())
    }
}

/// Next-stage trigger that counts its invocations.
#[derive(Debug, Default)]
pub struct RecordingNextStage {
    runs: Mutex<Vec<u64>>,
}

impl RecordingNextStage {
    /// Creates a new recording trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the test ids the trigger was invoked for.
    #[must_use]
    pub fn runs(&self) -> Vec<u64> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl NextStageTrigger for RecordingNextStage {
    async fn run_next(&self, test_id: u64) -> Result<(), GateError> {
        self.runs.lock().push(test_id);
        Ok(())
    }
}
