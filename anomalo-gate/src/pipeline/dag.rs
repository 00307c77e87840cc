//! StageGraph DAG execution engine.
//!
//! Executes stages as soon as their dependencies are met. Independent
//! branches (e.g. quarantine and continuation) run concurrently.

use super::StageSpec;
use crate::context::{
    ExecutionContext, PipelineContext, StageContext, StageInputs, UpstreamOutputs,
};
use crate::core::{StageOutput, StageStatus};
use crate::errors::GateError;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of executing a stage graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExecutionResult {
    /// The pipeline name.
    pub pipeline: String,
    /// The run this result belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_run_id: Option<Uuid>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// Per-stage outputs, for every stage that ran.
    pub outputs: BTreeMap<String, StageOutput>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// Whether every stage completed with a success status.
    pub success: bool,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GraphExecutionResult {
    /// Returns the output of a stage, if it ran.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.get(stage)
    }

    /// Returns the status of a stage, if it ran.
    #[must_use]
    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.outputs.get(stage).map(|o| o.status)
    }
}

/// A directed acyclic graph of stages for execution.
#[derive(Debug)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageSpec>,
    execution_order: Vec<String>,
}

impl StageGraph {
    /// Creates a new stage graph.
    ///
    /// Callers are expected to have validated the graph; see
    /// [`super::PipelineBuilder`].
    #[must_use]
    pub fn new(name: String, stages: HashMap<String, StageSpec>, stage_order: &[String]) -> Self {
        let execution_order = topological_sort(&stages, stage_order);

        Self {
            name,
            stages,
            execution_order,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns the specification of a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// Executes the stage graph.
    ///
    /// A failed or cancelled stage stops any further stages from being
    /// scheduled; stages already in flight are awaited so their outputs land
    /// in the result. A skipped stage counts as completed.
    ///
    /// # Errors
    ///
    /// Returns an error only for executor faults (a panicked stage task or a
    /// graph that cannot make progress). Stage failures are reported in the
    /// returned result.
    pub async fn execute(
        &self,
        ctx: Arc<PipelineContext>,
    ) -> Result<GraphExecutionResult, GateError> {
        let start = Instant::now();
        let started_at = Utc::now();

        ctx.try_emit_event(
            "pipeline.started",
            Some(serde_json::json!({
                "pipeline": &self.name,
                "stages": &self.execution_order,
            })),
        );

        let mut in_degree: HashMap<&str, usize> = self
            .stages
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.dependencies.len()))
            .collect();
        let mut completed: UpstreamOutputs = HashMap::new();
        let mut outputs: BTreeMap<String, StageOutput> = BTreeMap::new();
        let mut halted: Option<String> = None;
        let mut active: FuturesUnordered<JoinHandle<(String, StageOutput)>> =
            FuturesUnordered::new();

        for name in &self.execution_order {
            if in_degree.get(name.as_str()) == Some(&0) {
                active.push(self.spawn_stage_task(name, &ctx, &completed)?);
            }
        }

        while let Some(joined) = active.next().await {
            let (stage_name, output) =
                joined.map_err(|e| GateError::Internal(format!("Task join error: {e}")))?;

            match output.status {
                StageStatus::Fail if halted.is_none() => {
                    halted = Some(format!(
                        "Stage '{}' failed: {}",
                        stage_name,
                        output.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                StageStatus::Cancel if halted.is_none() => {
                    halted = Some(format!("Stage '{stage_name}' cancelled pipeline"));
                }
                status if status.is_success() => {
                    completed.insert(stage_name.clone(), output.data_or_empty());
                }
                _ => {}
            }
            let succeeded = output.is_success();
            outputs.insert(stage_name.clone(), output);

            if halted.is_none() && ctx.is_cancelled() {
                halted = Some(format!(
                    "Pipeline cancelled: {}",
                    ctx.cancel_reason().unwrap_or_else(|| "no reason given".to_string())
                ));
            }
            if halted.is_some() || !succeeded {
                continue;
            }

            for child in &self.execution_order {
                let Some(spec) = self.stages.get(child) else {
                    continue;
                };
                if !spec.dependencies.contains(&stage_name) {
                    continue;
                }
                if let Some(count) = in_degree.get_mut(child.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        active.push(self.spawn_stage_task(child, &ctx, &completed)?);
                    }
                }
            }
        }

        if halted.is_none() && outputs.len() < self.stages.len() {
            let pending: Vec<&String> = self
                .execution_order
                .iter()
                .filter(|name| !outputs.contains_key(*name))
                .collect();
            return Err(GateError::Internal(format!(
                "Deadlocked stage graph; remaining stages: {pending:?}"
            )));
        }

        let success = halted.is_none();
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Some(ref error) = halted {
            warn!(pipeline = %self.name, error = %error, "Pipeline halted");
        }
        ctx.try_emit_event(
            if success { "pipeline.completed" } else { "pipeline.failed" },
            Some(serde_json::json!({
                "pipeline": &self.name,
                "duration_ms": duration_ms,
                "error": &halted,
            })),
        );

        Ok(GraphExecutionResult {
            pipeline: self.name.clone(),
            pipeline_run_id: ctx.pipeline_run_id(),
            started_at,
            outputs,
            duration_ms,
            success,
            error: halted,
        })
    }

    /// Spawns a task to execute a single stage.
    fn spawn_stage_task(
        &self,
        stage_name: &str,
        ctx: &Arc<PipelineContext>,
        completed: &UpstreamOutputs,
    ) -> Result<JoinHandle<(String, StageOutput)>, GateError> {
        let spec = self
            .stages
            .get(stage_name)
            .cloned()
            .ok_or_else(|| GateError::Internal(format!("Unknown stage '{stage_name}'")))?;

        let upstream: UpstreamOutputs = completed
            .iter()
            .filter(|(name, _)| spec.dependencies.contains(*name))
            .map(|(name, data)| (name.clone(), data.clone()))
            .collect();
        let declared: HashSet<String> = spec.dependencies.clone();
        let inputs = StageInputs::new(upstream, declared, &spec.name, true);
        let stage_ctx = StageContext::new(ctx.clone(), &spec.name, inputs);

        Ok(tokio::spawn(async move {
            if stage_ctx.is_cancelled() {
                let output = StageOutput::cancel("Pipeline cancelled before stage started");
                stage_ctx.try_emit_event("stage.cancelled", None);
                return (spec.name, output);
            }

            stage_ctx.try_emit_event("stage.started", Some(serde_json::json!({"kind": spec.kind})));
            let stage_start = Instant::now();

            let output = spec.runner.execute(&stage_ctx).await;
            let duration_ms = stage_start.elapsed().as_secs_f64() * 1000.0;
            debug!(stage = %spec.name, status = %output.status, duration_ms, "Stage finished");

            match output.status {
                StageStatus::Ok => stage_ctx.try_emit_event(
                    "stage.completed",
                    Some(serde_json::json!({"duration_ms": duration_ms})),
                ),
                StageStatus::Skip => stage_ctx.try_emit_event(
                    "stage.skipped",
                    Some(serde_json::json!({"reason": output.skip_reason})),
                ),
                StageStatus::Fail => stage_ctx.try_emit_event(
                    "stage.failed",
                    Some(serde_json::json!({"error": output.error, "duration_ms": duration_ms})),
                ),
                StageStatus::Cancel => stage_ctx.try_emit_event(
                    "stage.cancelled",
                    Some(serde_json::json!({"reason": output.cancel_reason})),
                ),
                StageStatus::Pending | StageStatus::Running => {}
            }

            (spec.name, output)
        }))
    }
}

/// Performs topological sort on the stage graph, visiting in insertion order
/// so the result is deterministic.
fn topological_sort(stages: &HashMap<String, StageSpec>, stage_order: &[String]) -> Vec<String> {
    fn visit(
        node: &str,
        stages: &HashMap<String, StageSpec>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(node) || temp_visited.contains(node) {
            return;
        }

        temp_visited.insert(node.to_string());

        if let Some(spec) = stages.get(node) {
            for dep in spec.sorted_dependencies() {
                visit(dep, stages, visited, temp_visited, result);
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());
    }

    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    for name in stage_order {
        visit(name, stages, &mut visited, &mut temp_visited, &mut result);
    }

    result
}
