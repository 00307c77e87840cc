//! # anomalo-gate
//!
//! A data-quality gate driven by remote Anomalo validation tests.
//!
//! The gate is a small stage pipeline:
//!
//! - **Trigger**: start a remote test run and record the raw response
//! - **Verify**: fetch the run's results and classify them as passed or failed
//! - **Quarantine**: on failure, move bad records aside
//! - **Continue**: on success, start the next piece of work
//!
//! Stages are composed through declared dependencies and executed by a
//! small DAG engine that starts each stage as soon as its dependencies have
//! completed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use anomalo_gate::prelude::*;
//!
//! let config = GateConfig::from_env()?;
//! let gate = GatePipeline::from_config(config)?;
//!
//! let result = gate.run(std::sync::Arc::new(gate.context())).await?;
//! println!("gate passed: {}", result.success);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod gate;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::{AnomaloClient, ApiResponse, TestRunApi};
    pub use crate::config::GateConfig;
    pub use crate::context::{
        ExecutionContext, PipelineContext, RunIdentity, StageContext, StageInputs,
    };
    pub use crate::core::{StageKind, StageOutput, StageStatus};
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, GateError, PipelineValidationError,
        UndeclaredDependencyError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gate::{
        GatePipeline, LoggingNextStage, LoggingRecordMover, NextStageTrigger, RecordMover, Verdict,
    };
    pub use crate::pipeline::{GraphExecutionResult, PipelineBuilder, StageGraph, StageSpec};
    pub use crate::stages::{FnStage, NoOpStage, Stage};
}
