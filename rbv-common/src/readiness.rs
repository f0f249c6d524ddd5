//! Readiness controller.
//!
//! ```text
//! NotStarted -> CheckingExisting -> AlreadyReady ---------------------> Ready
//!                                \-> BringingUp -> WaitingHealthy ----> Ready
//!                                          \              \-----------> Failed
//!                                           \-------------------------> Failed
//! ```
//!
//! Services are waited on one at a time in [`ServiceKind::ORDERED`]; the
//! first one that exhausts its budget fails the run and the stack is torn
//! down.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ReadinessConfig;
use crate::errors::{VerifyError, VerifyResult};
use crate::lifecycle::StackLifecycle;
use crate::poll::{PollProgress, RetryPolicy, wait_until_healthy};
use crate::preflight::{PreflightReport, Severity};
use crate::probes::{ProbeSet, ServiceKind};

/// Lines of failed bring-up output carried into the error.
const BRING_UP_TAIL_LINES: usize = 20;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    NotStarted,
    CheckingExisting,
    AlreadyReady,
    BringingUp,
    WaitingHealthy,
    Ready,
    Failed,
}

/// Health check for one managed service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceCheck {
    pub service: ServiceKind,
    pub policy: RetryPolicy,
}

impl ServiceCheck {
    /// Checks for every service, in dependency order.
    pub fn from_config(config: &ReadinessConfig) -> Vec<ServiceCheck> {
        ServiceKind::ORDERED
            .into_iter()
            .map(|service| {
                let budget = match service {
                    ServiceKind::Database => &config.database,
                    ServiceKind::Cache => &config.cache,
                    ServiceKind::SearchIndex => &config.search_index,
                    ServiceKind::Application => &config.application,
                };
                ServiceCheck {
                    service,
                    policy: RetryPolicy::from_budget(budget, config.backoff, config.max_delay),
                }
            })
            .collect()
    }
}

/// How long one service took to become healthy.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceWait {
    pub service: ServiceKind,
    pub attempts: u32,
    #[serde(with = "crate::config::duration_str")]
    pub elapsed: Duration,
}

/// Outcome of a successful readiness run.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    /// The stack was already healthy and bring-up was skipped.
    pub reused_existing: bool,
    pub transitions: Vec<ReadinessState>,
    pub waits: Vec<ServiceWait>,
    pub preflight: Option<PreflightReport>,
}

/// Drives the stack from unknown to ready.
pub struct ReadinessController<'a, L, P> {
    lifecycle: &'a L,
    probes: &'a P,
    checks: Vec<ServiceCheck>,
    required_services: Vec<String>,
    force_bring_up: bool,
    transitions: Vec<ReadinessState>,
}

impl<'a, L, P> ReadinessController<'a, L, P>
where
    L: StackLifecycle,
    P: ProbeSet,
{
    pub fn new(lifecycle: &'a L, probes: &'a P, checks: Vec<ServiceCheck>) -> Self {
        Self {
            lifecycle,
            probes,
            checks,
            required_services: Vec::new(),
            force_bring_up: false,
            transitions: vec![ReadinessState::NotStarted],
        }
    }

    /// Services that must be listed as running before the existing stack is reused.
    pub fn required_services(mut self, services: Vec<String>) -> Self {
        self.required_services = services;
        self
    }

    /// Skip the existing-stack short-circuit.
    pub fn force_bring_up(mut self, force: bool) -> Self {
        self.force_bring_up = force;
        self
    }

    pub fn state(&self) -> ReadinessState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(ReadinessState::NotStarted)
    }

    pub fn transitions(&self) -> &[ReadinessState] {
        &self.transitions
    }

    fn transition(&mut self, next: ReadinessState) {
        info!(from = ?self.state(), to = ?next, "Readiness transition");
        self.transitions.push(next);
    }

    /// Run to `Ready` or fail. Teardown happens before an error is returned
    /// whenever the stack was touched.
    pub async fn run(
        &mut self,
        mut on_progress: impl FnMut(&PollProgress<'_>),
    ) -> VerifyResult<ReadinessReport> {
        self.transition(ReadinessState::CheckingExisting);
        if !self.force_bring_up && self.already_ready().await {
            info!("All services already running and healthy, skipping bring-up");
            self.transition(ReadinessState::AlreadyReady);
            self.transition(ReadinessState::Ready);
            return Ok(ReadinessReport {
                reused_existing: true,
                transitions: self.transitions.clone(),
                waits: Vec::new(),
                preflight: None,
            });
        }

        self.transition(ReadinessState::BringingUp);
        let preflight = self.lifecycle.preflight().await;
        for issue in &preflight.issues {
            match issue.severity {
                Severity::Error => error!(check = %issue.check, "{}", issue.message),
                Severity::Warning => warn!(check = %issue.check, "{}", issue.message),
                Severity::Info => info!(check = %issue.check, "{}", issue.message),
            }
        }
        if preflight.has_errors() {
            return Err(self
                .fail(VerifyError::Environment(preflight.error_summary()))
                .await);
        }

        let stopped = self.lifecycle.stop_all().await;
        if !stopped.succeeded {
            warn!(output = %stopped.output, "Stopping previous stack failed, starting anyway");
        }

        let started = self.lifecycle.start_all().await;
        if !started.succeeded {
            return Err(self
                .fail(VerifyError::BringUp {
                    action: "start".to_string(),
                    detail: tail_lines(&started.output, BRING_UP_TAIL_LINES),
                })
                .await);
        }
        info!(duration = ?started.duration, "Services started");

        self.transition(ReadinessState::WaitingHealthy);
        let probes = self.probes;
        let mut waits = Vec::with_capacity(self.checks.len());
        for check in self.checks.clone() {
            let service = check.service;
            info!(
                service = %service,
                max_attempts = check.policy.max_attempts(),
                budget = %humantime::format_duration(check.policy.budget()),
                "Waiting for service"
            );
            let wait = wait_until_healthy(
                service.label(),
                &check.policy,
                move || probes.probe(service),
                &mut on_progress,
            )
            .await;

            if !wait.healthy {
                return Err(self
                    .fail(VerifyError::ReadinessTimeout {
                        service: service.label().to_string(),
                        attempts: wait.attempts,
                        waited: wait.elapsed,
                    })
                    .await);
            }
            waits.push(ServiceWait {
                service,
                attempts: wait.attempts,
                elapsed: wait.elapsed,
            });
        }

        self.transition(ReadinessState::Ready);
        Ok(ReadinessReport {
            reused_existing: false,
            transitions: self.transitions.clone(),
            waits,
            preflight: Some(preflight),
        })
    }

    /// Cheap check: required services listed as running and each probe healthy once.
    async fn already_ready(&self) -> bool {
        if !self.required_services.is_empty() {
            let running = self.lifecycle.running_services().await;
            if let Some(missing) = self
                .required_services
                .iter()
                .find(|required| !running.contains(required))
            {
                info!(service = %missing, "Required service not running");
                return false;
            }
        }

        for check in &self.checks {
            match self.probes.probe(check.service).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(service = %check.service, "Service running but not healthy");
                    return false;
                }
                Err(e) => {
                    info!(service = %check.service, error = %e, "Service not reachable");
                    return false;
                }
            }
        }
        true
    }

    /// Enter `Failed`, tearing down only when the stack was touched.
    async fn fail(&mut self, err: VerifyError) -> VerifyError {
        self.transition(ReadinessState::Failed);
        if err.requires_teardown() {
            error!(error = %err, "Readiness failed, tearing down");
            teardown(self.lifecycle).await;
        } else {
            error!(error = %err, "Readiness failed before the stack was touched");
        }
        err
    }
}

/// Best-effort stop. The result is logged, never verified.
pub async fn teardown<L: StackLifecycle>(lifecycle: &L) {
    let result = lifecycle.stop_all().await;
    if result.succeeded {
        info!("Stack stopped");
    } else {
        warn!(output = %result.output, "Teardown failed");
    }
}

fn tail_lines(output: &str, n: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
