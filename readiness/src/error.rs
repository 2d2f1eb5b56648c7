//! Hard failures surfaced by an orchestration run.
//!
//! Probe timeouts, launch failures, and poll exhaustion never appear here: they
//! are absorbed into the `Unreachable` outcome. Cleanup failures are logged only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The endpoint was not reachable after the fast probe and any supervised launch.
    #[error("endpoint {endpoint} is not reachable")]
    Unreachable { endpoint: String },

    /// The caller's verification step failed against a reachable endpoint.
    #[error("verification against {endpoint} failed")]
    Verification {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },
}

impl HarnessError {
    /// Stable CLI exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Unreachable { .. } => crate::exit_codes::UNREACHABLE,
            HarnessError::Verification { .. } => crate::exit_codes::VERIFICATION_FAILED,
        }
    }
}
