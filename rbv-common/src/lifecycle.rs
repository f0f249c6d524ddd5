//! Service lifecycle control for the container stack.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::VerifyConfig;
use crate::preflight::{PreflightReport, run_preflight};
use crate::process::{CommandResult, CommandSpec, run_command};

/// Stop/start control over the whole stack.
pub trait StackLifecycle: Send + Sync {
    /// Prerequisites for stop/start.
    fn preflight(&self) -> impl Future<Output = PreflightReport> + Send;

    /// Names of services currently running. Empty when unknown.
    fn running_services(&self) -> impl Future<Output = Vec<String>> + Send;

    /// Stop every service. Idempotent.
    fn stop_all(&self) -> impl Future<Output = CommandResult> + Send;

    /// Build if needed and start every service detached.
    fn start_all(&self) -> impl Future<Output = CommandResult> + Send;
}

/// `docker-compose` (or `docker compose`) in the project directory.
pub struct ComposeStack {
    config: VerifyConfig,
    project_dir: PathBuf,
    program: String,
    base_args: Vec<String>,
    stop_timeout: Duration,
    start_timeout: Duration,
}

impl ComposeStack {
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            config: config.clone(),
            project_dir: config.project_dir.clone(),
            program: config.stack.compose_program.clone(),
            base_args: config.stack.compose_args.clone(),
            stop_timeout: config.stack.stop_timeout,
            start_timeout: config.stack.start_timeout,
        }
    }

    fn compose(&self, args: &[&str], timeout: Duration) -> CommandSpec {
        let all_args = self
            .base_args
            .iter()
            .map(String::as_str)
            .chain(args.iter().copied());
        CommandSpec::new(self.program.as_str(), all_args)
            .current_dir(&self.project_dir)
            .timeout(timeout)
    }
}

/// Parse `ps --services` output.
pub fn parse_service_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl StackLifecycle for ComposeStack {
    async fn preflight(&self) -> PreflightReport {
        run_preflight(&self.config).await
    }

    async fn running_services(&self) -> Vec<String> {
        let spec = self.compose(
            &["ps", "--services", "--filter", "status=running"],
            Duration::from_secs(30),
        );
        let result = run_command(&spec).await;
        if result.succeeded {
            let services = parse_service_list(&result.output);
            debug!(services = ?services, "Running services");
            services
        } else {
            debug!(output = %result.output, "Could not list running services");
            Vec::new()
        }
    }

    async fn stop_all(&self) -> CommandResult {
        info!("Stopping existing services");
        run_command(&self.compose(&["down"], self.stop_timeout)).await
    }

    async fn start_all(&self) -> CommandResult {
        info!(
            timeout = %humantime::format_duration(self.start_timeout),
            "Building and starting services"
        );
        run_command(&self.compose(&["up", "-d", "--build"], self.start_timeout).streamed()).await
    }
}
