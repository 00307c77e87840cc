//! Protocol trait for the remote test-execution service.

use crate::errors::GateError;
use async_trait::async_trait;

/// A raw response from the remote service.
///
/// Transport failures are reported as errors by the [`TestRunApi`]
/// implementation; any HTTP status, including errors, arrives here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body as text, exactly as received.
    pub body: String,
}

impl ApiResponse {
    /// Creates a new response.
    #[must_use]
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// Whether the service accepted the request.
    ///
    /// Only 200 counts; the service answers every successful call with it.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Parses the body as JSON, failing with the body attached when the
    /// status is not a success.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RemoteCall`] for a non-success status and
    /// [`GateError::Serialization`] for a body that is not JSON.
    pub fn into_json(self, operation: &str) -> Result<serde_json::Value, GateError> {
        if !self.is_success() {
            return Err(GateError::remote_call(operation, self.status_code, self.body));
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Protocol for the remote test-execution service.
#[async_trait]
pub trait TestRunApi: Send + Sync + std::fmt::Debug {
    /// Starts a run of the given test (`POST /api/tests/{id}/run`).
    async fn run_test(&self, test_id: u64) -> Result<ApiResponse, GateError>;

    /// Fetches the results of the given test (`GET /api/tests/{id}/results`).
    async fn fetch_results(&self, test_id: u64) -> Result<ApiResponse, GateError>;
}
