//! Final run report: text for terminals, JSON for machines.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::probes::{HealthState, ServiceStatus};
use crate::readiness::ReadinessReport;
use crate::scenario::seed::{DEMO_ADMIN_PASSWORD, DEMO_ADMIN_USERNAME, SeedOutcome};
use crate::scenario::{ContextKey, OutcomeCounts, OutcomeStatus, RunContext, ScenarioReport, TestOutcome};
use crate::unit_tests::UnitTestSummary;

const RULE_WIDTH: usize = 80;
const NAME_WIDTH: usize = 30;

/// Overall judgement from the success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Excellent,
    Good,
    NeedsAttention,
}

impl Verdict {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 90.0 {
            Verdict::Excellent
        } else if rate >= 70.0 {
            Verdict::Good
        } else {
            Verdict::NeedsAttention
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::Excellent => "EXCELLENT - the stack is working well",
            Verdict::Good => "GOOD - most checks pass, a few need review",
            Verdict::NeedsAttention => "NEEDS ATTENTION - several checks failed",
        }
    }

    fn colored(self) -> ColoredString {
        match self {
            Verdict::Excellent => self.message().green().bold(),
            Verdict::Good => self.message().yellow().bold(),
            Verdict::NeedsAttention => self.message().red().bold(),
        }
    }
}

/// An entity the scenario left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEntity {
    pub kind: ContextKey,
    pub id: Option<String>,
    pub label: Option<String>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(with = "crate::config::duration_str")]
    pub duration: Duration,
    /// Absent when the scenario ran against a stack this run did not check.
    pub readiness: Option<ReadinessReport>,
    pub seed: Option<SeedOutcome>,
    pub unit_tests: Option<UnitTestSummary>,
    pub outcomes: Vec<TestOutcome>,
    pub counts: OutcomeCounts,
    pub success_rate: f64,
    pub verdict: Verdict,
    /// Why the scenario stopped early.
    pub aborted: Option<String>,
    pub created: Vec<CreatedEntity>,
    pub system_status: Vec<ServiceStatus>,
}

impl RunReport {
    pub fn from_scenario(started_at: DateTime<Utc>, scenario: ScenarioReport) -> Self {
        let success_rate = scenario.counts.success_rate();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            duration: Duration::ZERO,
            readiness: None,
            seed: None,
            unit_tests: None,
            created: created_entities(&scenario.context),
            outcomes: scenario.outcomes,
            counts: scenario.counts,
            success_rate,
            verdict: Verdict::from_rate(success_rate),
            aborted: scenario.aborted,
            system_status: Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(RULE_WIDTH);

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{}", "REDBUS VERIFICATION REPORT".bold());
        let _ = writeln!(out, "Run {} started {}", self.run_id, self.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "{rule}");

        if let Some(readiness) = &self.readiness {
            if readiness.reused_existing {
                let _ = writeln!(out, "Stack: already running and healthy, bring-up skipped");
            } else {
                let _ = writeln!(out, "Stack: brought up");
                for wait in &readiness.waits {
                    let _ = writeln!(
                        out,
                        "  {:<14} healthy after {} attempt(s) ({:.1}s)",
                        wait.service.label(),
                        wait.attempts,
                        wait.elapsed.as_secs_f64()
                    );
                }
            }
        }

        match &self.seed {
            Some(SeedOutcome::Seeded(s)) => {
                let _ = writeln!(
                    out,
                    "Seed data: {} operators, {} routes, {} buses, {} schedules (login {DEMO_ADMIN_USERNAME} / {DEMO_ADMIN_PASSWORD})",
                    s.operators, s.routes, s.buses, s.schedules
                );
            }
            Some(SeedOutcome::AlreadySeeded) => {
                let _ = writeln!(out, "Seed data: already present");
            }
            Some(SeedOutcome::Failed(reason)) => {
                let _ = writeln!(out, "Seed data: {} ({reason})", "failed".yellow());
            }
            None => {}
        }

        if let Some(unit) = &self.unit_tests {
            let state = if unit.succeeded { "passed".green() } else { "failed".red() };
            let _ = write!(out, "Unit tests: {state}");
            if let Some(c) = &unit.counts {
                let _ = write!(
                    out,
                    " ({} run, {} failures, {} errors, {} skipped)",
                    c.run, c.failures, c.errors, c.skipped
                );
            }
            let _ = writeln!(out);
            if let Some(cov) = &unit.coverage {
                let _ = writeln!(
                    out,
                    "  Coverage: {}% instructions, {}% branches",
                    cov.instruction, cov.branch
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "SCENARIO RESULTS".bold());
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        for (i, outcome) in self.outcomes.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}. {:<width$} {} {}",
                i + 1,
                outcome.name,
                status_cell(outcome.status),
                outcome.detail,
                width = NAME_WIDTH
            );
        }
        if let Some(reason) = &self.aborted {
            let _ = writeln!(out, "{} {reason}", "Scenario aborted:".red().bold());
        }

        let c = &self.counts;
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Total: {}  Passed: {}  Failed: {}  Skipped: {}  Partial: {}",
            c.total, c.passed, c.failed, c.skipped, c.partial
        );
        let _ = writeln!(out, "Success Rate: {:.1}%", self.success_rate);
        let _ = writeln!(out, "Verdict: {}", self.verdict.colored());

        if !self.created.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", "CREATED ENTITIES".bold());
            for entity in &self.created {
                let _ = writeln!(
                    out,
                    "  {:<18} id={:<10} {}",
                    entity.kind.as_str(),
                    entity.id.as_deref().unwrap_or("-"),
                    entity.label.as_deref().unwrap_or("")
                );
            }
        }

        if !self.system_status.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", "SYSTEM STATUS".bold());
            let _ = out.write_str(&render_status(&self.system_status));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Duration: {:.1}s", self.duration.as_secs_f64());
        let _ = writeln!(out, "{rule}");
        out
    }
}

fn status_cell(status: OutcomeStatus) -> ColoredString {
    let cell = format!("{:<7}", status.as_str());
    match status {
        OutcomeStatus::Pass => cell.green(),
        OutcomeStatus::Fail => cell.red(),
        OutcomeStatus::Skip => cell.dimmed(),
        OutcomeStatus::Partial => cell.yellow(),
    }
}

/// One line per service.
pub fn render_status(statuses: &[ServiceStatus]) -> String {
    let mut out = String::new();
    for status in statuses {
        let state = match &status.state {
            HealthState::Healthy => "healthy".green(),
            HealthState::Unhealthy => "unhealthy".red(),
            HealthState::Unreachable(reason) => format!("unreachable: {reason}").red(),
        };
        let _ = writeln!(out, "  {:<14} {state}", status.service.label());
    }
    out
}

/// Non-secret context entries with their identifiers.
pub fn created_entities(ctx: &RunContext) -> Vec<CreatedEntity> {
    ctx.public_entries()
        .filter(|(_, value)| value.is_object())
        .map(|(kind, value)| CreatedEntity {
            kind,
            id: value.get("id").and_then(crate::scenario::context::path_segment),
            label: entity_label(value),
        })
        .collect()
}

fn entity_label(value: &Value) -> Option<String> {
    let text = |key: &str| value.get(key).and_then(Value::as_str);
    if let (Some(origin), Some(destination)) = (text("origin"), text("destination")) {
        return Some(format!("{origin} -> {destination}"));
    }
    ["name", "busNumber", "bookingReference", "username"]
        .into_iter()
        .find_map(text)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::ServiceKind;
    use serde_json::json;

    fn outcome(name: &str, status: OutcomeStatus) -> TestOutcome {
        TestOutcome {
            name: name.into(),
            status,
            detail: "detail".into(),
        }
    }

    fn scenario(outcomes: Vec<TestOutcome>) -> ScenarioReport {
        let mut context = RunContext::new();
        context.set(ContextKey::AdminToken, json!("secret-token"));
        context.set(ContextKey::Route, json!({"id": 4, "origin": "Mumbai", "destination": "Pune"}));
        context.set(ContextKey::Bus, json!({"id": "b-9", "busNumber": "TEST-BUS-1"}));
        context.set(ContextKey::BookedSeats, json!([3, 4]));
        ScenarioReport {
            counts: OutcomeCounts::from_outcomes(&outcomes),
            outcomes,
            aborted: None,
            context,
        }
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(Verdict::from_rate(100.0), Verdict::Excellent);
        assert_eq!(Verdict::from_rate(90.0), Verdict::Excellent);
        assert_eq!(Verdict::from_rate(89.9), Verdict::Good);
        assert_eq!(Verdict::from_rate(70.0), Verdict::Good);
        assert_eq!(Verdict::from_rate(69.9), Verdict::NeedsAttention);
        assert_eq!(Verdict::from_rate(0.0), Verdict::NeedsAttention);
    }

    #[test]
    fn test_created_entities_hide_secrets() {
        let report = RunReport::from_scenario(Utc::now(), scenario(vec![]));
        assert_eq!(
            report.created,
            vec![
                CreatedEntity {
                    kind: ContextKey::Route,
                    id: Some("4".into()),
                    label: Some("Mumbai -> Pune".into()),
                },
                CreatedEntity {
                    kind: ContextKey::Bus,
                    id: Some("b-9".into()),
                    label: Some("TEST-BUS-1".into()),
                },
            ]
        );
    }

    #[test]
    fn test_render_text_in_execution_order() {
        let mut report = RunReport::from_scenario(
            Utc::now(),
            scenario(vec![
                outcome("Admin Registration", OutcomeStatus::Pass),
                outcome("User Login", OutcomeStatus::Pass),
                outcome("Search Index Sync", OutcomeStatus::Fail),
                outcome("Booking Creation", OutcomeStatus::Skip),
            ]),
        );
        report.system_status = vec![ServiceStatus {
            service: ServiceKind::Application,
            state: HealthState::Healthy,
        }];

        let text = report.render_text();

        let first = text.find("Admin Registration").unwrap();
        let third = text.find("Search Index Sync").unwrap();
        assert!(first < third);
        assert!(text.contains("Success Rate: 50.0%"));
        assert!(text.contains("Total: 4  Passed: 2  Failed: 1  Skipped: 1  Partial: 0"));
        assert!(text.contains("SYSTEM STATUS"));
        assert!(!text.contains("secret-token"));
        assert_eq!(report.verdict, Verdict::NeedsAttention);
    }

    #[test]
    fn test_json_report_shape() {
        let report = RunReport::from_scenario(
            Utc::now(),
            scenario(vec![outcome("Public Search", OutcomeStatus::Partial)]),
        );
        let value: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["outcomes"][0]["status"], "PARTIAL");
        assert_eq!(value["verdict"], "needs_attention");
        assert_eq!(value["counts"]["partial"], 1);
        assert!(value["readiness"].is_null());
    }
}
