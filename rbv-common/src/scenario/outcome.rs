//! Step outcomes and the append-only outcome log.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Skip,
    Partial,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Pass => "PASS",
            OutcomeStatus::Fail => "FAIL",
            OutcomeStatus::Skip => "SKIP",
            OutcomeStatus::Partial => "PARTIAL",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub status: OutcomeStatus,
    pub detail: String,
}

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub partial: usize,
}

impl OutcomeCounts {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut counts, o| {
            counts.total += 1;
            match o.status {
                OutcomeStatus::Pass => counts.passed += 1,
                OutcomeStatus::Fail => counts.failed += 1,
                OutcomeStatus::Skip => counts.skipped += 1,
                OutcomeStatus::Partial => counts.partial += 1,
            }
            counts
        })
    }

    /// Passed over total, in percent. Zero for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Execution-ordered outcomes. Entries are never edited.
#[derive(Debug, Clone, Default)]
pub struct OutcomeLog {
    outcomes: Vec<TestOutcome>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, status: OutcomeStatus, detail: impl Into<String>) {
        let detail = detail.into();
        match status {
            OutcomeStatus::Pass => info!(step = name, status = %status, "{detail}"),
            OutcomeStatus::Skip => info!(step = name, status = %status, "{detail}"),
            OutcomeStatus::Fail | OutcomeStatus::Partial => {
                warn!(step = name, status = %status, "{detail}")
            }
        }
        self.outcomes.push(TestOutcome {
            name: name.to_string(),
            status,
            detail,
        });
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::from_outcomes(&self.outcomes)
    }

    pub fn into_vec(self) -> Vec<TestOutcome> {
        self.outcomes
    }
}
