//! The integration scenario.
//!
//! A fixed, ordered list of steps. Each step reads what it needs from the
//! [`RunContext`], calls the API, records one [`TestOutcome`] and stores
//! what later steps need. The manual resync records nothing when no resync
//! is wanted. A step whose inputs are missing is skipped
//! without touching the API. Only the first step (admin registration) ends
//! the scenario early when it fails.

mod booking;
mod catalog;
pub mod context;
mod operations;
pub mod outcome;
pub mod seats;
pub mod seed;

pub use context::{ContextKey, RunContext};
pub use outcome::{OutcomeCounts, OutcomeLog, OutcomeStatus, TestOutcome};

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde_json::Value;
use tracing::{error, info};

use crate::api::{ApiClient, ApiResponse, HttpTransport};
use crate::config::{ResyncPolicy, ScenarioConfig};
use crate::poll::DeadlinePolicy;

/// Per-run inputs of the scenario.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    /// Suffix making every created entity unique to this run.
    pub run_tag: String,
    pub travel_date: NaiveDate,
    pub demo_origin: String,
    pub demo_destination: String,
    pub consistency: DeadlinePolicy,
    pub resync: ResyncPolicy,
    /// Seeds the fallback seat choice.
    pub seat_seed: u64,
}

impl ScenarioSettings {
    pub fn from_config(config: &ScenarioConfig, now: DateTime<Utc>) -> Self {
        let ts = now.timestamp();
        Self {
            run_tag: ts.to_string(),
            travel_date: config
                .travel_date
                .unwrap_or_else(|| next_monday(now.date_naive())),
            demo_origin: config.demo_origin.clone(),
            demo_destination: config.demo_destination.clone(),
            consistency: DeadlinePolicy::new(
                config.consistency_interval,
                config.consistency_deadline,
            ),
            resync: config.resync,
            seat_seed: ts.unsigned_abs(),
        }
    }
}

/// First Monday strictly after `today`. Test schedules run Monday to Friday.
pub fn next_monday(today: NaiveDate) -> NaiveDate {
    let offset = 7 - u64::from(today.weekday().num_days_from_monday());
    today + Days::new(offset)
}

/// Everything a scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub outcomes: Vec<TestOutcome>,
    pub counts: OutcomeCounts,
    /// Why the scenario stopped early.
    pub aborted: Option<String>,
    pub context: RunContext,
}

/// Runs the scenario against one API client.
pub struct ScenarioRunner<'a, T> {
    client: &'a ApiClient<T>,
    settings: ScenarioSettings,
    ctx: RunContext,
    log: OutcomeLog,
}

impl<'a, T: HttpTransport> ScenarioRunner<'a, T> {
    pub fn new(client: &'a ApiClient<T>, settings: ScenarioSettings) -> Self {
        Self {
            client,
            settings,
            ctx: RunContext::new(),
            log: OutcomeLog::new(),
        }
    }

    /// Execute every step in order.
    pub async fn run(mut self) -> ScenarioReport {
        info!(
            run_tag = %self.settings.run_tag,
            travel_date = %self.settings.travel_date,
            "Starting integration scenario"
        );

        if let Err(reason) = self.register_admin().await {
            error!(reason = %reason, "Admin registration failed, no later step can authenticate");
            return self.finish(Some(reason));
        }
        self.login_admin().await;
        self.read_profile().await;

        self.list_resource("List Operators", "/operator/operators").await;
        self.create_operator().await;
        self.list_resource("List Routes", "/operator/routes").await;
        self.create_route().await;
        self.list_resource("List Buses", "/operator/buses").await;
        self.create_bus().await;
        self.list_resource("List Schedules", "/operator/schedules").await;
        self.create_schedule().await;
        self.verify_searchable().await;
        self.public_search().await;
        self.system_health().await;

        self.register_user().await;
        self.login_user().await;
        self.search_offers().await;
        self.lookup_booked_seats().await;
        self.create_booking().await;
        self.fetch_booking().await;
        self.list_user_bookings().await;
        self.resubmit_booking().await;
        self.cancel_booking().await;
        self.verify_cancellation().await;
        self.verify_seat_release().await;

        self.ingest_tracking().await;
        self.current_location().await;
        self.location_history().await;
        self.premium_operator().await;
        self.sync_status().await;
        self.manual_resync().await;

        self.finish(None)
    }

    fn finish(self, aborted: Option<String>) -> ScenarioReport {
        let counts = self.log.counts();
        info!(
            total = counts.total,
            passed = counts.passed,
            failed = counts.failed,
            skipped = counts.skipped,
            "Scenario finished"
        );
        ScenarioReport {
            outcomes: self.log.into_vec(),
            counts,
            aborted,
            context: self.ctx,
        }
    }

    fn record(&mut self, step: &str, status: OutcomeStatus, detail: impl Into<String>) {
        self.log.record(step, status, detail);
    }

    /// Record `Skip` and return true when any required key is absent.
    fn skip_if_missing(&mut self, step: &str, required: &[ContextKey]) -> bool {
        let missing = self.ctx.missing(required);
        if missing.is_empty() {
            return false;
        }
        let names: Vec<_> = missing.iter().map(|k| k.as_str()).collect();
        self.record(
            step,
            OutcomeStatus::Skip,
            format!("Missing {}", names.join(", ")),
        );
        true
    }

    /// Record `Pass` with `detail` when ok, otherwise `Fail` with the API message.
    fn record_response(&mut self, step: &str, response: &ApiResponse, detail: impl Into<String>) {
        if response.ok {
            self.record(step, OutcomeStatus::Pass, detail);
        } else {
            self.record(step, OutcomeStatus::Fail, response.message.clone());
        }
    }

    fn token(&self, key: ContextKey) -> Option<String> {
        self.ctx.string(key)
    }
}

/// Identifier for display.
fn display_id(value: Option<&Value>) -> String {
    value
        .and_then(context::path_segment)
        .unwrap_or_else(|| "?".to_string())
}

/// Message for a call that was ok but lacked what the step needed.
fn failure_detail(response: &ApiResponse, missing: &str) -> String {
    if response.ok {
        format!("{} but {missing}", response.message)
    } else {
        response.message.clone()
    }
}
