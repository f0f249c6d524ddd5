//! Full scenario runs against the in-memory API.

mod common;

use std::time::Duration;

use chrono::NaiveDate;
use rbv_common::api::ApiClient;
use rbv_common::config::ResyncPolicy;
use rbv_common::poll::DeadlinePolicy;
use rbv_common::scenario::seed::{SeedOutcome, seed_baseline};
use rbv_common::scenario::{ContextKey, OutcomeStatus, ScenarioReport, ScenarioRunner, ScenarioSettings};

use common::{FakeOptions, FakeRedBus, init_test_logging};

const STEPS: usize = 30;

fn settings(deadline_ms: u64) -> ScenarioSettings {
    ScenarioSettings {
        run_tag: "1780000000".into(),
        travel_date: NaiveDate::from_ymd_opt(2030, 3, 4).unwrap(),
        demo_origin: "Mumbai".into(),
        demo_destination: "Pune".into(),
        consistency: DeadlinePolicy::new(
            Duration::from_millis(2),
            Duration::from_millis(deadline_ms),
        ),
        resync: ResyncPolicy::WhenDiverged,
        seat_seed: 42,
    }
}

async fn seeded_run(options: FakeOptions, deadline_ms: u64) -> (FakeRedBus, ScenarioReport) {
    init_test_logging();
    let fake = FakeRedBus::new(options);
    let client = ApiClient::new(fake.transport());
    let seeded = seed_baseline(&client, Duration::ZERO).await;
    assert!(matches!(seeded, SeedOutcome::Seeded(_)), "seeding failed: {seeded:?}");
    let report = ScenarioRunner::new(&client, settings(deadline_ms)).run().await;
    (fake, report)
}

fn status_of(report: &ScenarioReport, name: &str) -> OutcomeStatus {
    report
        .outcomes
        .iter()
        .find(|o| o.name == name)
        .unwrap_or_else(|| panic!("no outcome named {name}"))
        .status
}

#[tokio::test]
async fn test_happy_path_passes_every_step() {
    crate::test_log!("TEST START: test_happy_path_passes_every_step");
    let (fake, report) = seeded_run(
        FakeOptions {
            index_lag: 3,
            ..FakeOptions::default()
        },
        2_000,
    )
    .await;

    let failures: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.status != OutcomeStatus::Pass)
        .collect();
    assert!(failures.is_empty(), "unexpected outcomes: {failures:#?}");
    assert_eq!(report.outcomes.len(), STEPS);
    assert_eq!(report.counts.passed, STEPS);
    assert!(report.aborted.is_none());

    // Step order is fixed.
    assert_eq!(report.outcomes[0].name, "Admin Registration");
    assert_eq!(report.outcomes[11].name, "Search Index Sync");
    assert_eq!(report.outcomes[STEPS - 1].name, "Data Sync Status");

    assert!(report.context.contains(ContextKey::CancelledBooking));
    assert!(report.context.contains(ContextKey::PremiumBus));
    assert_eq!(fake.active_bookings(), 0);
    assert_eq!(fake.sync_triggers(), 0);
    crate::test_log!("TEST PASS: test_happy_path_passes_every_step");
}

#[tokio::test]
async fn test_index_that_never_catches_up_fails_only_the_sync_check() {
    crate::test_log!("TEST START: test_index_that_never_catches_up_fails_only_the_sync_check");
    let (fake, report) = seeded_run(
        FakeOptions {
            index_lag: 10_000,
            ..FakeOptions::default()
        },
        30,
    )
    .await;

    let sync = report
        .outcomes
        .iter()
        .find(|o| o.name == "Search Index Sync")
        .unwrap();
    assert_eq!(sync.status, OutcomeStatus::Fail);
    assert!(sync.detail.contains("not yet indexed"), "{}", sync.detail);

    // Nothing seeded is searchable either, so the booking chain is skipped.
    assert_eq!(status_of(&report, "Enhanced Bus Search"), OutcomeStatus::Fail);
    assert_eq!(status_of(&report, "Booking Creation"), OutcomeStatus::Skip);
    assert_eq!(status_of(&report, "Seat Release"), OutcomeStatus::Skip);

    // Independent checks still run.
    assert_eq!(status_of(&report, "Tracking Ingestion"), OutcomeStatus::Pass);
    assert_eq!(status_of(&report, "Data Sync Status"), OutcomeStatus::Pass);

    // Diverged counts trigger a resync.
    assert_eq!(status_of(&report, "Manual Sync"), OutcomeStatus::Pass);
    assert_eq!(fake.sync_triggers(), 1);
    crate::test_log!("TEST PASS: test_index_that_never_catches_up_fails_only_the_sync_check");
}

#[tokio::test]
async fn test_accepted_duplicate_booking_fails_and_is_cancelled() {
    crate::test_log!("TEST START: test_accepted_duplicate_booking_fails_and_is_cancelled");
    let (fake, report) = seeded_run(
        FakeOptions {
            accept_duplicate_bookings: true,
            ..FakeOptions::default()
        },
        500,
    )
    .await;

    assert_eq!(status_of(&report, "Seat Validation"), OutcomeStatus::Fail);
    // One cancel for the duplicate, one for the original booking.
    assert_eq!(fake.cancel_calls().len(), 2);
    assert_eq!(fake.active_bookings(), 0);
    assert_eq!(status_of(&report, "Seat Release"), OutcomeStatus::Pass);
    crate::test_log!("TEST PASS: test_accepted_duplicate_booking_fails_and_is_cancelled");
}

#[tokio::test]
async fn test_failing_endpoint_does_not_stop_later_steps() {
    crate::test_log!("TEST START: test_failing_endpoint_does_not_stop_later_steps");
    let (_fake, report) = seeded_run(
        FakeOptions {
            failing_paths: vec!["/tracking/update".into()],
            ..FakeOptions::default()
        },
        500,
    )
    .await;

    let tracking = report
        .outcomes
        .iter()
        .find(|o| o.name == "Tracking Ingestion")
        .unwrap();
    assert_eq!(tracking.status, OutcomeStatus::Fail);
    assert_eq!(tracking.detail, "HTTP 503: Service Unavailable");
    assert_eq!(status_of(&report, "Advanced Operator Management"), OutcomeStatus::Pass);
    assert_eq!(report.outcomes.len(), STEPS);
    crate::test_log!("TEST PASS: test_failing_endpoint_does_not_stop_later_steps");
}

#[tokio::test]
async fn test_ignored_cancellation_fails_status_and_release_checks() {
    crate::test_log!("TEST START: test_ignored_cancellation_fails_status_and_release_checks");
    let (fake, report) = seeded_run(
        FakeOptions {
            ignore_cancellation: true,
            ..FakeOptions::default()
        },
        500,
    )
    .await;

    assert_eq!(status_of(&report, "Booking Cancellation"), OutcomeStatus::Pass);
    let status = report
        .outcomes
        .iter()
        .find(|o| o.name == "Cancellation Status")
        .unwrap();
    assert_eq!(status.status, OutcomeStatus::Fail);
    assert_eq!(status.detail, "Status after cancellation: CONFIRMED");

    let release = report.outcomes.iter().find(|o| o.name == "Seat Release").unwrap();
    assert_eq!(release.status, OutcomeStatus::Fail);
    assert!(
        release.detail.starts_with("Seats still held after cancellation:"),
        "{}",
        release.detail
    );
    assert_eq!(fake.active_bookings(), 1);
    crate::test_log!("TEST PASS: test_ignored_cancellation_fails_status_and_release_checks");
}

#[tokio::test]
async fn test_unreported_initial_status_is_partial() {
    let (_fake, report) = seeded_run(
        FakeOptions {
            omit_initial_status: true,
            ..FakeOptions::default()
        },
        500,
    )
    .await;

    let status = report
        .outcomes
        .iter()
        .find(|o| o.name == "Cancellation Status")
        .unwrap();
    assert_eq!(status.status, OutcomeStatus::Partial);
    assert!(status.detail.contains("not reported"), "{}", status.detail);
    assert_eq!(status_of(&report, "Seat Release"), OutcomeStatus::Pass);
}

#[tokio::test]
async fn test_seats_held_after_cancellation_fail_release_only() {
    let (_fake, report) = seeded_run(
        FakeOptions {
            hold_cancelled_seats: true,
            ..FakeOptions::default()
        },
        500,
    )
    .await;

    assert_eq!(status_of(&report, "Cancellation Status"), OutcomeStatus::Pass);
    assert_eq!(status_of(&report, "Seat Release"), OutcomeStatus::Fail);
}

#[tokio::test]
async fn test_seeding_twice_is_idempotent() {
    init_test_logging();
    let fake = FakeRedBus::new(FakeOptions::default());
    let client = ApiClient::new(fake.transport());

    let first = seed_baseline(&client, Duration::ZERO).await;
    let second = seed_baseline(&client, Duration::ZERO).await;

    assert!(matches!(first, SeedOutcome::Seeded(s) if s.schedules == 8));
    assert_eq!(second, SeedOutcome::AlreadySeeded);
    assert_eq!(fake.schedule_count(), 8);
}
