//! Shared engine for the RedBus stack verifier.
//!
//! Brings the container stack to a healthy state, runs the integration
//! scenario against the application API and aggregates the results.

pub mod api;
pub mod config;
pub mod consistency;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;
pub mod poll;
pub mod preflight;
pub mod probes;
pub mod process;
pub mod readiness;
pub mod report;
pub mod scenario;
pub mod unit_tests;

pub use api::{ApiClient, ApiResponse, HttpTransport, MockTransport, ReqwestTransport};
pub use config::{ConfigError, VerifyConfig};
pub use errors::{VerifyError, VerifyResult};
pub use lifecycle::{ComposeStack, StackLifecycle};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use pipeline::Pipeline;
pub use probes::{ProbeSet, ServiceKind, StackProbes};
pub use readiness::{ReadinessController, ReadinessState};
pub use report::{RunReport, Verdict};
pub use scenario::{OutcomeStatus, ScenarioReport, ScenarioRunner, ScenarioSettings, TestOutcome};
