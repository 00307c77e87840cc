//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications
//! - A pipeline builder that validates declared dependencies
//! - A DAG executor that runs each stage once its dependencies complete

mod builder;
mod dag;
mod spec;

pub use builder::PipelineBuilder;
pub use dag::{GraphExecutionResult, StageGraph};
pub use spec::StageSpec;
