//! Client for the remote test-execution service.
//!
//! This module provides:
//! - The [`TestRunApi`] trait the gate stages talk to
//! - [`AnomaloClient`], the reqwest-backed implementation

mod anomalo;
mod protocol;

pub use anomalo::AnomaloClient;
pub use protocol::{ApiResponse, TestRunApi};
