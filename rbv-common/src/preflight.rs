//! Local prerequisites checked before the stack is (re)started.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::VerifyConfig;
use crate::process::{CommandSpec, run_command};

/// Severity level for issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// Blocks bring-up.
    Error,
}

/// An issue found during preflight checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightIssue {
    pub severity: Severity,
    /// Which check found the issue.
    pub check: String,
    pub message: String,
    pub remediation: Option<String>,
}

/// Result of all preflight checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Reported by `docker --version`.
    pub docker_version: Option<String>,
    pub issues: Vec<PreflightIssue>,
}

impl PreflightReport {
    fn push(&mut self, severity: Severity, check: &str, message: impl Into<String>, remediation: Option<&str>) {
        self.issues.push(PreflightIssue {
            severity,
            check: check.to_string(),
            message: message.into(),
            remediation: remediation.map(str::to_string),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// One line per error, with remediation when known.
    pub fn error_summary(&self) -> String {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| match &i.remediation {
                Some(fix) => format!("{}: {} ({fix})", i.check, i.message),
                None => format!("{}: {}", i.check, i.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Parse `Docker version 24.0.6, build ed223bc` into `24.0.6`.
pub fn parse_docker_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .nth(2)
        .map(|v| v.trim_end_matches(',').to_string())
        .filter(|v| !v.is_empty())
}

/// Check tools, daemon and project files.
pub async fn run_preflight(config: &VerifyConfig) -> PreflightReport {
    let mut report = PreflightReport::default();

    if which::which("docker").is_err() {
        report.push(
            Severity::Error,
            "docker",
            "docker not found on PATH",
            Some("install Docker and make sure `docker` is on PATH"),
        );
    } else {
        let version = run_command(&CommandSpec::new("docker", ["--version"])).await;
        if version.succeeded {
            report.docker_version = parse_docker_version(&version.output);
            info!(version = ?report.docker_version, "Docker available");
        } else {
            report.push(Severity::Error, "docker", version.output, None);
        }

        let daemon = run_command(&CommandSpec::new("docker", ["ps"])).await;
        if !daemon.succeeded {
            report.push(
                Severity::Error,
                "docker-daemon",
                format!("Docker daemon is not reachable: {}", daemon.output),
                Some("start the Docker daemon"),
            );
        }
    }

    let compose = &config.stack.compose_program;
    if compose != "docker" && which::which(compose).is_err() {
        report.push(
            Severity::Error,
            "compose",
            format!("{compose} not found on PATH"),
            Some("install docker-compose or set stack.compose_program = \"docker\" with compose_args = [\"compose\"]"),
        );
    }

    check_required_files(&config.project_dir, &config.stack.required_files, &mut report);

    debug!(issues = report.issues.len(), "Preflight finished");
    report
}

fn check_required_files(dir: &Path, files: &[String], report: &mut PreflightReport) {
    for file in files {
        let path = dir.join(file);
        if path.is_file() {
            debug!(file = %path.display(), "Found required file");
        } else {
            report.push(
                Severity::Error,
                "project-files",
                format!("Required file not found: {}", path.display()),
                Some("run from the project root or pass --project-dir"),
            );
        }
    }
}
