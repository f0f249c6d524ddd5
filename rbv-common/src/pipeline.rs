//! End-to-end run: readiness, seeding, unit tests, scenario, report.

use std::time::Instant;

use chrono::Utc;
use tracing::info;

use crate::api::{ApiClient, HttpTransport};
use crate::config::VerifyConfig;
use crate::errors::VerifyResult;
use crate::lifecycle::StackLifecycle;
use crate::poll::PollProgress;
use crate::probes::{ProbeSet, snapshot};
use crate::readiness::{ReadinessController, ServiceCheck};
use crate::report::RunReport;
use crate::scenario::seed::seed_baseline;
use crate::scenario::{ScenarioRunner, ScenarioSettings};
use crate::unit_tests::run_unit_tests;

/// Log one health attempt at info level.
pub fn log_progress(progress: &PollProgress<'_>) {
    match (progress.max_attempts, progress.next_delay) {
        (Some(max), Some(delay)) => info!(
            service = progress.label,
            attempt = progress.attempt,
            max_attempts = max,
            retry_in = %humantime::format_duration(delay),
            "Not healthy yet"
        ),
        (Some(max), None) => info!(
            service = progress.label,
            attempt = progress.attempt,
            max_attempts = max,
            "Not healthy on final attempt"
        ),
        (None, _) => info!(
            check = progress.label,
            poll = progress.attempt,
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "Still waiting"
        ),
    }
}

/// The collaborators of one run.
pub struct Pipeline<'a, L, P, T> {
    config: &'a VerifyConfig,
    lifecycle: &'a L,
    probes: &'a P,
    client: &'a ApiClient<T>,
}

impl<'a, L, P, T> Pipeline<'a, L, P, T>
where
    L: StackLifecycle,
    P: ProbeSet,
    T: HttpTransport,
{
    pub fn new(
        config: &'a VerifyConfig,
        lifecycle: &'a L,
        probes: &'a P,
        client: &'a ApiClient<T>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            probes,
            client,
        }
    }

    /// Full run. Errors only when the stack could not be made ready.
    pub async fn run(&self) -> VerifyResult<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let readiness = ReadinessController::new(
            self.lifecycle,
            self.probes,
            ServiceCheck::from_config(&self.config.readiness),
        )
        .required_services(self.config.stack.required_services.clone())
        .force_bring_up(self.config.readiness.force_bring_up)
        .run(log_progress)
        .await?;

        // Fresh deployments only.
        let fresh = !readiness.reused_existing;
        let seed = if fresh && self.config.seed.enabled {
            Some(seed_baseline(self.client, self.config.seed.settle).await)
        } else {
            None
        };
        let unit_tests = if fresh && self.config.unit_tests.enabled {
            Some(run_unit_tests(&self.config.unit_tests, &self.config.project_dir).await)
        } else {
            None
        };

        let mut report = self.scenario(started_at).await;
        report.readiness = Some(readiness);
        report.seed = seed;
        report.unit_tests = unit_tests;
        report.duration = clock.elapsed();
        Ok(report)
    }

    /// Scenario and system status only, against whatever is running.
    pub async fn run_scenario_only(&self) -> RunReport {
        let clock = Instant::now();
        let mut report = self.scenario(Utc::now()).await;
        report.duration = clock.elapsed();
        report
    }

    async fn scenario(&self, started_at: chrono::DateTime<Utc>) -> RunReport {
        let settings = ScenarioSettings::from_config(&self.config.scenario, started_at);
        let scenario = ScenarioRunner::new(self.client, settings).run().await;
        let mut report = RunReport::from_scenario(started_at, scenario);
        report.system_status = snapshot(self.probes).await;
        report
    }
}
