//! Context management for pipeline execution.
//!
//! This module provides:
//! - Run identity for correlating events
//! - Pipeline and stage execution contexts
//! - Stage inputs that enforce declared dependencies

mod execution;
mod identity;
mod inputs;

pub use execution::{ExecutionContext, PipelineContext, StageContext};
pub use identity::RunIdentity;
pub use inputs::{StageInputs, UpstreamOutputs};
