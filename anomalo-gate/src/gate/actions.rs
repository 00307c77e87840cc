//! Pluggable actions taken on a verdict.

use crate::errors::GateError;
use async_trait::async_trait;
use tracing::info;

/// Relocates the records that failed validation.
#[async_trait]
pub trait RecordMover: Send + Sync {
    /// Moves the bad records of `test_id` to `destination`.
    async fn move_bad_records(&self, destination: &str, test_id: u64) -> Result<(), GateError>;
}

/// Starts whatever comes after a passing gate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NextStageTrigger: Send + Sync {
    /// Starts the follow-up work for `test_id`.
    async fn run_next(&self, test_id: u64) -> Result<(), GateError>;
}

/// Default mover: logs the move and touches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRecordMover;

#[async_trait]
impl RecordMover for LoggingRecordMover {
    async fn move_bad_records(&self, destination: &str, test_id: u64) -> Result<(), GateError> {
        info!(test_id, destination, "Bad records moved to {destination}");
        Ok(())
    }
}

/// Default trigger: logs and returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNextStage;

#[async_trait]
impl NextStageTrigger for LoggingNextStage {
    async fn run_next(&self, test_id: u64) -> Result<(), GateError> {
        info!(test_id, "Running next task");
        Ok(())
    }
}
