//! Core domain model types.
//!
//! This module contains the fundamental types shared by the stage engine:
//! - Stage status and kind enums
//! - Stage output type with factory methods

mod output;
mod status;

pub use output::StageOutput;
pub use status::{StageKind, StageStatus};
