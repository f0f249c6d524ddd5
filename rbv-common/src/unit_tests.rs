//! Backend unit-test suite with coverage.
//!
//! Runs the configured build command in the project directory and summarises
//! the surefire counts and the JaCoCo totals. The outcome is informational;
//! it never fails the run.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::UnitTestConfig;
use crate::process::{CommandSpec, run_command};

/// Totals from the last `Tests run:` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestCounts {
    pub run: u32,
    pub failures: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl TestCounts {
    pub fn passed(&self) -> u32 {
        self.run
            .saturating_sub(self.failures + self.errors + self.skipped)
    }
}

/// Percentages from the coverage report's total row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub instruction: u32,
    pub branch: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitTestSummary {
    pub command: String,
    pub succeeded: bool,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub counts: Option<TestCounts>,
    pub coverage: Option<Coverage>,
    #[serde(with = "crate::config::duration_str")]
    pub duration: Duration,
}

/// Run the suite and summarise it.
pub async fn run_unit_tests(config: &UnitTestConfig, project_dir: &Path) -> UnitTestSummary {
    let spec = CommandSpec::new(&config.program, &config.args)
        .timeout(config.timeout)
        .current_dir(project_dir)
        .streamed();
    info!(command = %spec.display(), timeout = ?config.timeout, "Running backend unit tests");

    let result = run_command(&spec).await;
    let counts = parse_test_counts(&result.output);
    let coverage = if result.succeeded {
        read_coverage(&project_dir.join(&config.coverage_report))
    } else {
        None
    };

    match (&counts, result.succeeded) {
        (Some(c), true) => info!(run = c.run, failures = c.failures, errors = c.errors, skipped = c.skipped, "Unit tests passed"),
        (Some(c), false) => warn!(run = c.run, failures = c.failures, errors = c.errors, "Unit tests had failures, continuing"),
        (None, _) => warn!(succeeded = result.succeeded, exit_code = ?result.exit_code, "No unit test summary found"),
    }
    if let Some(cov) = &coverage {
        info!(instruction = cov.instruction, branch = cov.branch, "Coverage");
    }

    UnitTestSummary {
        command: spec.display(),
        succeeded: result.succeeded,
        timed_out: result.timed_out,
        exit_code: result.exit_code,
        counts,
        coverage,
        duration: result.duration,
    }
}

/// Parse the last `Tests run: N, Failures: F, Errors: E, Skipped: S` line.
pub fn parse_test_counts(output: &str) -> Option<TestCounts> {
    let re = Regex::new(r"Tests run:\s*(\d+),\s*Failures:\s*(\d+),\s*Errors:\s*(\d+),\s*Skipped:\s*(\d+)")
        .ok()?;
    let caps = output.lines().rev().find_map(|line| re.captures(line))?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse().ok());
    Some(TestCounts {
        run: num(1)?,
        failures: num(2)?,
        errors: num(3)?,
        skipped: num(4)?,
    })
}

/// Instruction and branch percentages from the `Total` row of the report.
pub fn parse_coverage(html: &str) -> Option<Coverage> {
    let re = Regex::new(r"(\d+)%").ok()?;
    let total = &html[html.find("Total")?..];
    let mut percents = re
        .captures_iter(total)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()));
    Some(Coverage {
        instruction: percents.next()?,
        branch: percents.next()?,
    })
}

fn read_coverage(path: &Path) -> Option<Coverage> {
    match std::fs::read_to_string(path) {
        Ok(html) => parse_coverage(&html),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Coverage report not readable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAVEN_TAIL: &str = "\
[INFO] Tests run: 12, Failures: 0, Errors: 0, Skipped: 0, Time elapsed: 1.2 s - in com.redbus.service.BookingServiceTest
[INFO] Results:
[INFO]
[WARNING] Tests run: 87, Failures: 2, Errors: 1, Skipped: 3
[INFO] BUILD SUCCESS";

    const JACOCO: &str = r#"<table><thead><tr><td>Element</td></tr></thead>
<tbody><tr><td>com.redbus.service</td><td class="ctr2">91%</td><td class="ctr2">80%</td></tr></tbody>
<tfoot><tr><td>Total</td><td class="bar">1,204 of 5,120</td><td class="ctr2">76%</td><td class="bar">210 of 512</td><td class="ctr2">58%</td></tr></tfoot></table>"#;

    #[test]
    fn test_last_summary_line_wins() {
        let counts = parse_test_counts(MAVEN_TAIL).unwrap();
        assert_eq!(
            counts,
            TestCounts {
                run: 87,
                failures: 2,
                errors: 1,
                skipped: 3
            }
        );
        assert_eq!(counts.passed(), 81);
    }

    #[test]
    fn test_no_summary_line() {
        assert_eq!(parse_test_counts("[ERROR] BUILD FAILURE"), None);
    }

    #[test]
    fn test_coverage_from_total_row() {
        assert_eq!(
            parse_coverage(JACOCO),
            Some(Coverage {
                instruction: 76,
                branch: 58
            })
        );
        assert_eq!(parse_coverage("<html>no totals</html>"), None);
    }

    #[test]
    fn test_read_coverage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, JACOCO).unwrap();
        assert_eq!(read_coverage(&path).map(|c| c.branch), Some(58));
        assert_eq!(read_coverage(&dir.path().join("missing.html")), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_unit_tests_parses_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = UnitTestConfig {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo 'Tests run: 4, Failures: 1, Errors: 0, Skipped: 0'; exit 1".into(),
            ],
            timeout: Duration::from_secs(10),
            ..UnitTestConfig::default()
        };

        let summary = run_unit_tests(&config, dir.path()).await;

        assert!(!summary.succeeded);
        assert_eq!(summary.counts.map(|c| c.failures), Some(1));
        assert_eq!(summary.coverage, None);
    }
}
