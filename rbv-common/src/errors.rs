//! Error taxonomy for a verification run.
//!
//! Only conditions that end the run live in [`VerifyError`]. Scenario step
//! failures, consistency misses and unit-test failures are recorded as values
//! in the report instead.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Terminal errors for a verification run.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Local prerequisites are missing (tools, daemon, project files).
    #[error("Environment check failed: {0}")]
    Environment(String),

    /// Stopping or starting the stack failed.
    #[error("Failed to {action} the stack: {detail}")]
    BringUp { action: String, detail: String },

    /// A service started but never became healthy within its budget.
    #[error("{service} did not become healthy after {attempts} attempts ({})", human(.waited))]
    ReadinessTimeout {
        service: String,
        attempts: u32,
        waited: Duration,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run was interrupted by a signal.
    #[error("Interrupted")]
    Interrupted,
}

impl VerifyError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            VerifyError::Environment(_) | VerifyError::Config(_) => 2,
            VerifyError::BringUp { .. } => 3,
            VerifyError::ReadinessTimeout { .. } => 4,
            VerifyError::Interrupted => 130,
        }
    }

    /// Whether the stack should be torn down after this error.
    pub fn requires_teardown(&self) -> bool {
        matches!(
            self,
            VerifyError::BringUp { .. } | VerifyError::ReadinessTimeout { .. } | VerifyError::Interrupted
        )
    }
}

fn human(waited: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*waited)
}

/// Result alias for run-terminal operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
