//! The four gate stages.

use super::{NextStageTrigger, RecordMover, Verdict, VERDICT_KEY};
use crate::client::TestRunApi;
use crate::config::{ConfigError, GateConfig, ENV_QUARANTINE_TABLE};
use crate::context::{ExecutionContext, StageContext};
use crate::core::StageOutput;
use crate::errors::GateError;
use crate::stages::Stage;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Stage data key holding the trigger response.
pub const TEST_RESULTS_KEY: &str = "test_results";

fn into_output(name: &str, result: Result<StageOutput, GateError>) -> StageOutput {
    result.unwrap_or_else(|e| {
        debug!(stage = name, error = %e, "Stage failed");
        StageOutput::fail(e.to_string())
    })
}

async fn persist_results(path: &Path, body: &str) -> Result<(), GateError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Starts a remote test run and records the raw response.
#[derive(Debug)]
pub struct TriggerRunStage {
    name: String,
    config: Arc<GateConfig>,
    api: Arc<dyn TestRunApi>,
}

impl TriggerRunStage {
    /// Creates the trigger stage.
    #[must_use]
    pub fn new(name: impl Into<String>, config: Arc<GateConfig>, api: Arc<dyn TestRunApi>) -> Self {
        Self {
            name: name.into(),
            config,
            api,
        }
    }

    async fn run(&self) -> Result<StageOutput, GateError> {
        let response = self.api.run_test(self.config.test_id).await?;
        if !response.is_success() {
            return Err(GateError::remote_call("run test", response.status_code, response.body));
        }

        let results: serde_json::Value = serde_json::from_str(&response.body)?;
        if let Some(path) = &self.config.results_path {
            persist_results(path, &response.body).await?;
            debug!(path = %path.display(), "Wrote test results");
        }

        Ok(StageOutput::ok_value(TEST_RESULTS_KEY, results)
            .add_metadata("test_id", serde_json::json!(self.config.test_id)))
    }
}

#[async_trait]
impl Stage for TriggerRunStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        into_output(&self.name, self.run().await)
    }
}

/// Fetches the results of the run and classifies them.
#[derive(Debug)]
pub struct VerifyResultsStage {
    name: String,
    config: Arc<GateConfig>,
    api: Arc<dyn TestRunApi>,
}

impl VerifyResultsStage {
    /// Creates the verify stage.
    #[must_use]
    pub fn new(name: impl Into<String>, config: Arc<GateConfig>, api: Arc<dyn TestRunApi>) -> Self {
        Self {
            name: name.into(),
            config,
            api,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, GateError> {
        let test_id = self.config.test_id;
        let results = self
            .api
            .fetch_results(test_id)
            .await?
            .into_json("verify test results")?;
        let verdict = Verdict::from_results(&results, test_id)?;

        info!(test_id, verdict = %verdict, "Test results verified");
        ctx.try_emit_event("gate.verdict", Some(serde_json::json!({"verdict": verdict})));

        Ok(StageOutput::ok_value(VERDICT_KEY, serde_json::json!(verdict))
            .add_metadata("status", results["status"].clone()))
    }
}

#[async_trait]
impl Stage for VerifyResultsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(&self.name, self.run(ctx).await)
    }
}

/// Moves bad records aside when the test failed.
pub struct QuarantineStage {
    name: String,
    config: Arc<GateConfig>,
    mover: Arc<dyn RecordMover>,
}

impl fmt::Debug for QuarantineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuarantineStage")
            .field("name", &self.name)
            .field("quarantine_table", &self.config.quarantine_table)
            .finish_non_exhaustive()
    }
}

impl QuarantineStage {
    /// Creates the quarantine stage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        config: Arc<GateConfig>,
        mover: Arc<dyn RecordMover>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            mover,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, GateError> {
        if Verdict::from_inputs(ctx.inputs())?.is_passed() {
            return Ok(StageOutput::skip("Test passed; nothing to quarantine"));
        }

        let destination = self
            .config
            .quarantine_table
            .as_deref()
            .ok_or_else(|| ConfigError::missing(ENV_QUARANTINE_TABLE))?;
        self.mover
            .move_bad_records(destination, self.config.test_id)
            .await?;

        Ok(StageOutput::ok_value("quarantined_to", serde_json::json!(destination)))
    }
}

#[async_trait]
impl Stage for QuarantineStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(&self.name, self.run(ctx).await)
    }
}

/// Starts the follow-up work when the test passed.
pub struct ContinuationStage {
    name: String,
    config: Arc<GateConfig>,
    next: Arc<dyn NextStageTrigger>,
}

impl fmt::Debug for ContinuationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationStage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ContinuationStage {
    /// Creates the continuation stage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        config: Arc<GateConfig>,
        next: Arc<dyn NextStageTrigger>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            next,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, GateError> {
        if !Verdict::from_inputs(ctx.inputs())?.is_passed() {
            return Ok(StageOutput::skip("Test failed; not continuing"));
        }

        self.next.run_next(self.config.test_id).await?;
        Ok(StageOutput::ok_value("continued", serde_json::json!(true)))
    }
}

#[async_trait]
impl Stage for ContinuationStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(&self.name, self.run(ctx).await)
    }
}
