//! Execution contexts for pipeline and stage execution.

use super::{RunIdentity, StageInputs};
use crate::events::{EventSink, NoOpEventSink};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Trait unifying pipeline and stage context behaviors.
pub trait ExecutionContext: Send + Sync {
    /// Returns the pipeline run ID.
    fn pipeline_run_id(&self) -> Option<Uuid>;

    /// Returns the topology name.
    fn topology(&self) -> Option<&str>;

    /// Tries to emit an event.
    fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Checks if the context is cancelled.
    fn is_cancelled(&self) -> bool;
}

/// The shared context for one pipeline execution.
pub struct PipelineContext {
    run_id: RunIdentity,
    topology: Option<String>,
    event_sink: Arc<dyn EventSink>,
    cancelled: AtomicBool,
    cancel_reason: RwLock<Option<String>>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("run_id", &self.run_id)
            .field("topology", &self.topology)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    /// Creates a new pipeline context that discards events.
    #[must_use]
    pub fn new(run_id: RunIdentity) -> Self {
        Self {
            run_id,
            topology: None,
            event_sink: Arc::new(NoOpEventSink),
            cancelled: AtomicBool::new(false),
            cancel_reason: RwLock::new(None),
        }
    }

    /// Sets the topology name.
    #[must_use]
    pub fn with_topology(mut self, topology: impl Into<String>) -> Self {
        self.topology = Some(topology.into());
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Marks the context as cancelled with a reason.
    pub fn mark_cancelled_with_reason(&self, reason: impl Into<String>) {
        self.cancelled.store(true, Ordering::SeqCst);
        *self.cancel_reason.write() = Some(reason.into());
    }

    /// Returns the cancel reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.read().clone()
    }

    /// Returns the run identity.
    #[must_use]
    pub const fn run_id(&self) -> &RunIdentity {
        &self.run_id
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    fn enrich(&self, data: Option<serde_json::Value>) -> serde_json::Value {
        let mut enriched = data.unwrap_or_else(|| serde_json::json!({}));

        if let serde_json::Value::Object(ref mut map) = enriched {
            if let Some(id) = self.run_id.pipeline_run_id {
                map.insert("pipeline_run_id".to_string(), serde_json::json!(id.to_string()));
            }
            if let Some(test_id) = self.run_id.test_id {
                map.insert("test_id".to_string(), serde_json::json!(test_id));
            }
            if let Some(ref topology) = self.topology {
                map.insert("topology".to_string(), serde_json::json!(topology));
            }
        }

        enriched
    }
}

impl ExecutionContext for PipelineContext {
    fn pipeline_run_id(&self) -> Option<Uuid> {
        self.run_id.pipeline_run_id
    }

    fn topology(&self) -> Option<&str> {
        self.topology.as_deref()
    }

    fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.event_sink.try_emit(event_type, Some(self.enrich(data)));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The context for a single stage execution.
#[derive(Debug)]
pub struct StageContext {
    pipeline_ctx: Arc<PipelineContext>,
    stage_name: String,
    inputs: StageInputs,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        pipeline_ctx: Arc<PipelineContext>,
        stage_name: impl Into<String>,
        inputs: StageInputs,
    ) -> Self {
        Self {
            pipeline_ctx,
            stage_name: stage_name.into(),
            inputs,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the stage inputs.
    #[must_use]
    pub const fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// Returns the pipeline context.
    #[must_use]
    pub const fn pipeline_ctx(&self) -> &Arc<PipelineContext> {
        &self.pipeline_ctx
    }
}

impl ExecutionContext for StageContext {
    fn pipeline_run_id(&self) -> Option<Uuid> {
        self.pipeline_ctx.pipeline_run_id()
    }

    fn topology(&self) -> Option<&str> {
        self.pipeline_ctx.topology()
    }

    fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = self.pipeline_ctx.enrich(data);
        if let serde_json::Value::Object(ref mut map) = enriched {
            map.insert("stage".to_string(), serde_json::json!(&self.stage_name));
        }
        self.pipeline_ctx.event_sink.try_emit(event_type, Some(enriched));
    }

    fn is_cancelled(&self) -> bool {
        self.pipeline_ctx.is_cancelled()
    }
}
