//! Testing utilities for gate pipelines.
//!
//! This module provides:
//! - Canned stages for exercising the executor
//! - An in-memory stand-in for the remote test service
//! - Recording record mover and next-stage trigger

mod mocks;

pub use mocks::{
    FailingStage, MockTestRunApi, RecordingNextStage, RecordingRecordMover, SuccessStage,
};
