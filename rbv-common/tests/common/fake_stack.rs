//! Scripted stack lifecycle and probes.

use std::sync::Mutex;
use std::time::Duration;

use rbv_common::lifecycle::StackLifecycle;
use rbv_common::preflight::PreflightReport;
use rbv_common::probes::{ProbeError, ProbeSet, ServiceKind};
use rbv_common::process::CommandResult;

fn result(succeeded: bool, output: &str) -> CommandResult {
    CommandResult {
        succeeded,
        output: output.to_string(),
        exit_code: Some(if succeeded { 0 } else { 1 }),
        timed_out: false,
        duration: Duration::ZERO,
    }
}

/// Lifecycle that records calls instead of running docker.
#[derive(Default)]
pub struct FakeStack {
    pub running: Vec<String>,
    pub start_fails: bool,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeStack {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StackLifecycle for FakeStack {
    async fn preflight(&self) -> PreflightReport {
        self.record("preflight");
        PreflightReport {
            docker_version: Some("27.1.1".into()),
            issues: Vec::new(),
        }
    }

    async fn running_services(&self) -> Vec<String> {
        self.running.clone()
    }

    async fn stop_all(&self) -> CommandResult {
        self.record("stop");
        result(true, "")
    }

    async fn start_all(&self) -> CommandResult {
        self.record("start");
        if self.start_fails {
            result(false, "Building app\nERROR: failed to solve: pom.xml not found")
        } else {
            result(true, "Started")
        }
    }
}

/// Per-service answers: healthy from the nth probe of that service, or never.
pub struct ScriptedProbes {
    healthy_from: [Option<u32>; 4],
    unreachable: bool,
    calls: Mutex<Vec<ServiceKind>>,
}

impl ScriptedProbes {
    pub fn new(healthy_from: [Option<u32>; 4]) -> Self {
        Self {
            healthy_from,
            unreachable: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_healthy() -> Self {
        Self::new([Some(1); 4])
    }

    /// Every probe fails at the transport level.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new([None; 4])
        }
    }

    pub fn calls(&self) -> Vec<ServiceKind> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProbeSet for ScriptedProbes {
    async fn probe(&self, service: ServiceKind) -> Result<bool, ProbeError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(service);
        if self.unreachable {
            return Err(ProbeError::Http("connection refused".into()));
        }
        let count = calls.iter().filter(|s| **s == service).count() as u32;
        let idx = ServiceKind::ORDERED
            .iter()
            .position(|s| *s == service)
            .unwrap();
        Ok(self.healthy_from[idx].is_some_and(|from| count >= from))
    }
}
