//! The data-quality gate pipeline.
//!
//! Four stages wired by declared dependencies:
//!
//! ```text
//! run_anomalo_tests -> verify_anomalo_results -> quarantine_bad_records
//!                                             \-> run_next_task
//! ```
//!
//! The verdict produced by the verify stage reaches the two leaf stages as
//! stage data; the results file written by the trigger stage is a record
//! only and is never read back.

mod actions;
mod stages;
mod verdict;

pub use actions::{LoggingNextStage, LoggingRecordMover, NextStageTrigger, RecordMover};
#[cfg(test)]
pub use actions::MockNextStageTrigger;
pub use stages::{
    ContinuationStage, QuarantineStage, TriggerRunStage, VerifyResultsStage, TEST_RESULTS_KEY,
};
pub use verdict::{Verdict, VERDICT_KEY};

use crate::client::{AnomaloClient, TestRunApi};
use crate::config::GateConfig;
use crate::context::{PipelineContext, RunIdentity};
use crate::core::StageKind;
use crate::errors::{GateError, PipelineValidationError};
use crate::pipeline::{GraphExecutionResult, PipelineBuilder, StageGraph, StageSpec};
use crate::stages::{NoOpStage, Stage};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the gate pipeline, used as the topology of its events.
pub const PIPELINE_NAME: &str = "anomalo-gate";
/// Starts the remote test run.
pub const TRIGGER_STAGE: &str = "run_anomalo_tests";
/// Classifies the run's results.
pub const VERIFY_STAGE: &str = "verify_anomalo_results";
/// Quarantines bad records on failure.
pub const QUARANTINE_STAGE: &str = "quarantine_bad_records";
/// Continues on success.
pub const CONTINUATION_STAGE: &str = "run_next_task";

fn assemble(
    trigger: Arc<dyn Stage>,
    verify: Arc<dyn Stage>,
    quarantine: Arc<dyn Stage>,
    continuation: Arc<dyn Stage>,
) -> Result<StageGraph, PipelineValidationError> {
    let mut builder = PipelineBuilder::new(PIPELINE_NAME);
    builder.add_stage_spec(StageSpec::new(TRIGGER_STAGE, trigger))?;
    builder.add_stage_spec(
        StageSpec::new(VERIFY_STAGE, verify)
            .with_dependency(TRIGGER_STAGE)
            .with_kind(StageKind::Guard),
    )?;
    for (name, runner) in [(QUARANTINE_STAGE, quarantine), (CONTINUATION_STAGE, continuation)] {
        builder.add_stage_spec(
            StageSpec::new(name, runner)
                .with_dependency(VERIFY_STAGE)
                .with_kind(StageKind::Route),
        )?;
    }
    builder.build()
}

/// The gate's stage graph with no-op runners, for inspecting its shape.
///
/// # Errors
///
/// Only if the fixed layout is itself invalid.
pub fn plan() -> Result<StageGraph, PipelineValidationError> {
    assemble(
        Arc::new(NoOpStage::new(TRIGGER_STAGE)),
        Arc::new(NoOpStage::new(VERIFY_STAGE)),
        Arc::new(NoOpStage::new(QUARANTINE_STAGE)),
        Arc::new(NoOpStage::new(CONTINUATION_STAGE)),
    )
}

/// A configured gate: one config, one remote client and the two actions.
#[derive(Clone)]
pub struct GatePipeline {
    config: Arc<GateConfig>,
    api: Arc<dyn TestRunApi>,
    mover: Arc<dyn RecordMover>,
    next: Arc<dyn NextStageTrigger>,
}

impl fmt::Debug for GatePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePipeline")
            .field("config", &self.config)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl GatePipeline {
    /// Creates a gate over the given remote API with the logging actions.
    #[must_use]
    pub fn new(config: GateConfig, api: Arc<dyn TestRunApi>) -> Self {
        Self {
            config: Arc::new(config),
            api,
            mover: Arc::new(LoggingRecordMover),
            next: Arc::new(LoggingNextStage),
        }
    }

    /// Creates a gate talking to the real service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: GateConfig) -> Result<Self, GateError> {
        let api = Arc::new(AnomaloClient::new(&config)?);
        Ok(Self::new(config, api))
    }

    /// Replaces the record mover.
    #[must_use]
    pub fn with_record_mover(mut self, mover: Arc<dyn RecordMover>) -> Self {
        self.mover = mover;
        self
    }

    /// Replaces the next-stage trigger.
    #[must_use]
    pub fn with_next_stage(mut self, next: Arc<dyn NextStageTrigger>) -> Self {
        self.next = next;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Builds the stage graph.
    ///
    /// # Errors
    ///
    /// Only if the fixed layout is itself invalid.
    pub fn build(&self) -> Result<StageGraph, PipelineValidationError> {
        assemble(
            Arc::new(TriggerRunStage::new(TRIGGER_STAGE, self.config.clone(), self.api.clone())),
            Arc::new(VerifyResultsStage::new(VERIFY_STAGE, self.config.clone(), self.api.clone())),
            Arc::new(QuarantineStage::new(
                QUARANTINE_STAGE,
                self.config.clone(),
                self.mover.clone(),
            )),
            Arc::new(ContinuationStage::new(
                CONTINUATION_STAGE,
                self.config.clone(),
                self.next.clone(),
            )),
        )
    }

    /// Creates a fresh context for one run of this gate.
    #[must_use]
    pub fn context(&self) -> PipelineContext {
        PipelineContext::new(RunIdentity::new().for_test(self.config.test_id))
            .with_topology(PIPELINE_NAME)
    }

    /// Runs the gate once.
    ///
    /// # Errors
    ///
    /// Returns an error for executor faults only; stage failures are
    /// reported in the result.
    pub async fn run(&self, ctx: Arc<PipelineContext>) -> Result<GraphExecutionResult, GateError> {
        let graph = self.build()?;
        info!(test_id = self.config.test_id, base_url = %self.config.base_url, "Running gate");
        graph.execute(ctx).await
    }

    /// Runs the gate, stopping early when `interrupted` resolves.
    ///
    /// The first interrupt cancels the context, so stages in flight finish
    /// but no new ones start. A second interrupt abandons the run.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Interrupted`] on a second interrupt, otherwise
    /// the same errors as [`GatePipeline::run`].
    pub async fn run_until_interrupted<F, Fut>(
        &self,
        ctx: Arc<PipelineContext>,
        mut interrupted: F,
    ) -> Result<GraphExecutionResult, GateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let run = self.run(ctx.clone());
        tokio::pin!(run);

        tokio::select! {
            biased;
            result = &mut run => return result,
            () = interrupted() => {
                warn!("Interrupted; no further stages will start. Interrupt again to abort");
                ctx.mark_cancelled_with_reason("interrupted");
            }
        }

        tokio::select! {
            biased;
            result = &mut run => result,
            () = interrupted() => {
                warn!("Interrupted again; abandoning the run");
                Err(GateError::Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::client::ApiResponse;
    use crate::core::StageStatus;
    use crate::events::CollectingEventSink;
    use crate::testing::{MockTestRunApi, RecordingNextStage, RecordingRecordMover};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Harness {
        gate: GatePipeline,
        api: Arc<MockTestRunApi>,
        mover: Arc<RecordingRecordMover>,
        next: Arc<RecordingNextStage>,
        sink: Arc<CollectingEventSink>,
    }

    impl Harness {
        fn new(config: GateConfig, api: MockTestRunApi) -> Self {
            let api = Arc::new(api);
            let mover = Arc::new(RecordingRecordMover::new());
            let next = Arc::new(RecordingNextStage::new());
            let gate = GatePipeline::new(config, api.clone())
                .with_record_mover(mover.clone())
                .with_next_stage(next.clone());
            Self {
                gate,
                api,
                mover,
                next,
                sink: Arc::new(CollectingEventSink::new()),
            }
        }

        async fn run(&self) -> GraphExecutionResult {
            let ctx = Arc::new(self.gate.context().with_event_sink(self.sink.clone()));
            self.gate.run(ctx).await.unwrap()
        }
    }

    /// A remote service that accepts the call and never answers.
    #[derive(Debug, Default)]
    struct HangingApi {
        called: Arc<Notify>,
    }

    #[async_trait]
    impl TestRunApi for HangingApi {
        async fn run_test(&self, _test_id: u64) -> Result<ApiResponse, GateError> {
            self.called.notify_one();
            std::future::pending().await
        }

        async fn fetch_results(&self, _test_id: u64) -> Result<ApiResponse, GateError> {
            std::future::pending().await
        }
    }

    /// In-memory log output for a scoped subscriber.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs the gate with the logging actions and returns what they logged.
    async fn run_with_logging_actions(status: &str) -> (GraphExecutionResult, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let gate = GatePipeline::new(config(42), Arc::new(MockTestRunApi::with_status(status)));
        let result = gate.run(Arc::new(gate.context())).await.unwrap();

        (result, buffer.contents())
    }

    fn config(test_id: u64) -> GateConfig {
        GateConfig::new("key", test_id)
            .with_quarantine_table("quarantine.bad_rows")
            .without_results_file()
    }

    #[test]
    fn test_plan_layout() {
        let graph = plan().unwrap();

        assert_eq!(
            graph.execution_order(),
            [TRIGGER_STAGE, VERIFY_STAGE, QUARANTINE_STAGE, CONTINUATION_STAGE]
        );
        assert_eq!(graph.stage(VERIFY_STAGE).unwrap().sorted_dependencies(), [TRIGGER_STAGE]);
        assert_eq!(graph.stage(QUARANTINE_STAGE).unwrap().sorted_dependencies(), [VERIFY_STAGE]);
        assert_eq!(graph.stage(CONTINUATION_STAGE).unwrap().sorted_dependencies(), [VERIFY_STAGE]);
        assert_eq!(graph.stage(TRIGGER_STAGE).unwrap().kind, StageKind::Work);
        assert_eq!(graph.stage(VERIFY_STAGE).unwrap().kind, StageKind::Guard);
        assert_eq!(graph.stage(QUARANTINE_STAGE).unwrap().kind, StageKind::Route);
    }

    #[tokio::test]
    async fn test_failed_test_quarantines_and_stops() {
        let harness = Harness::new(config(42), MockTestRunApi::with_status("failed"));

        let result = harness.run().await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(harness.mover.moves(), vec![("quarantine.bad_rows".to_string(), 42)]);
        assert!(harness.next.runs().is_empty());
        assert_eq!(result.status_of(QUARANTINE_STAGE), Some(StageStatus::Ok));
        assert_eq!(result.status_of(CONTINUATION_STAGE), Some(StageStatus::Skip));
        assert_eq!(harness.api.calls(), vec![("run", 42), ("results", 42)]);
    }

    #[tokio::test]
    async fn test_passed_test_continues() {
        let harness = Harness::new(config(42), MockTestRunApi::with_status("passed"));

        let result = harness.run().await;

        assert!(result.success);
        assert_eq!(harness.next.runs(), vec![42]);
        assert!(harness.mover.moves().is_empty());
        assert_eq!(result.status_of(QUARANTINE_STAGE), Some(StageStatus::Skip));
        assert_eq!(
            result.output(VERIFY_STAGE).unwrap().get(VERDICT_KEY),
            Some(&serde_json::json!("passed"))
        );
    }

    #[tokio::test]
    async fn test_trigger_failure_halts_gate() {
        let api = MockTestRunApi::new(
            ApiResponse::new(401, r#"{"detail": "invalid token"}"#),
            ApiResponse::new(200, r#"{"status": "passed"}"#),
        );
        let harness = Harness::new(config(42), api);

        let result = harness.run().await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some(concat!(
                "Stage 'run_anomalo_tests' failed: ",
                r#"Failed to run test: {"detail": "invalid token"}"#
            ))
        );
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(harness.api.calls(), vec![("run", 42)]);
        assert!(harness.mover.moves().is_empty());
        assert!(harness.next.runs().is_empty());
    }

    #[tokio::test]
    async fn test_missing_quarantine_table_fails_gate() {
        let harness = Harness::new(
            GateConfig::new("key", 1).without_results_file(),
            MockTestRunApi::with_status("failed"),
        );

        let result = harness.run().await;

        assert!(!result.success);
        assert_eq!(result.status_of(QUARANTINE_STAGE), Some(StageStatus::Fail));
        assert_eq!(result.status_of(CONTINUATION_STAGE), Some(StageStatus::Skip));
    }

    #[tokio::test]
    async fn test_results_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/test_results.json");
        let harness = Harness::new(
            config(5).with_results_path(&path),
            MockTestRunApi::with_status("passed"),
        );

        harness.run().await;

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"run_id": 1, "state": "queued"}"#
        );
    }

    #[tokio::test]
    async fn test_events_carry_test_id() {
        let harness = Harness::new(config(42), MockTestRunApi::with_status("failed"));

        harness.run().await;

        let verdicts = harness.sink.events_of_type("gate.verdict");
        assert_eq!(verdicts.len(), 1);
        let data = verdicts[0].1.as_ref().unwrap();
        assert_eq!(data["verdict"], "failed");
        assert_eq!(data["test_id"], 42);
        assert_eq!(data["stage"], VERIFY_STAGE);
        assert_eq!(harness.sink.events_of_type("stage.skipped").len(), 1);
    }

    #[tokio::test]
    async fn test_logging_mover_reports_destination_once() {
        let (result, logs) = run_with_logging_actions("failed").await;

        assert!(result.success);
        assert_eq!(logs.matches("Bad records moved to quarantine.bad_rows").count(), 1, "{logs}");
        assert_eq!(logs.matches("Running next task").count(), 0, "{logs}");
    }

    #[tokio::test]
    async fn test_logging_next_stage_reports_once() {
        let (result, logs) = run_with_logging_actions("passed").await;

        assert!(result.success);
        assert_eq!(logs.matches("Running next task").count(), 1, "{logs}");
        assert_eq!(logs.matches("Bad records moved to").count(), 0, "{logs}");
    }

    #[tokio::test]
    async fn test_first_interrupt_stops_new_stages() {
        let harness = Harness::new(config(42), MockTestRunApi::with_status("passed"));
        let ctx = Arc::new(harness.gate.context().with_event_sink(harness.sink.clone()));
        let interrupts = AtomicUsize::new(0);

        let result = harness
            .gate
            .run_until_interrupted(ctx.clone(), || {
                let first = interrupts.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if !first {
                        std::future::pending::<()>().await;
                    }
                }
            })
            .await
            .unwrap();

        assert!(!result.success);
        assert!(ctx.is_cancelled());
        assert_eq!(result.status_of(TRIGGER_STAGE), Some(StageStatus::Cancel));
        assert!(harness.api.calls().is_empty());
        assert!(harness.mover.moves().is_empty());
        assert!(harness.next.runs().is_empty());
    }

    #[tokio::test]
    async fn test_second_interrupt_abandons_hung_run() {
        let api = HangingApi::default();
        let called = api.called.clone();
        let gate = GatePipeline::new(config(42), Arc::new(api));
        let ctx = Arc::new(gate.context());
        let interrupts = AtomicUsize::new(0);

        // The first interrupt lands once the trigger call is stuck.
        let result = gate
            .run_until_interrupted(ctx.clone(), || {
                let first = interrupts.fetch_add(1, Ordering::SeqCst) == 0;
                let called = called.clone();
                async move {
                    if first {
                        called.notified().await;
                    }
                }
            })
            .await;

        assert!(matches!(result, Err(GateError::Interrupted)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_uninterrupted_run_completes() {
        let harness = Harness::new(config(42), MockTestRunApi::with_status("passed"));
        let ctx = Arc::new(harness.gate.context());

        let result = harness
            .gate
            .run_until_interrupted(ctx.clone(), std::future::pending::<()>)
            .await
            .unwrap();

        assert!(result.success);
        assert!(!ctx.is_cancelled());
        assert_eq!(harness.next.runs(), vec![42]);
    }
}
