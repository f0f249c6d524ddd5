//! Tracking, premium-operator and index-sync steps.

use serde_json::Value;
use tracing::{info, warn};

use super::context::ContextKey;
use super::outcome::OutcomeStatus;
use super::{ScenarioRunner, display_id, failure_detail};
use crate::api::payloads::{BusRequest, BusType, OperatorRequest, TrackingSample, TrackingUpdate};
use crate::api::{HttpMethod, HttpTransport};
use crate::config::ResyncPolicy;

/// A Mumbai to Pune journey.
const TRACKING_SAMPLES: [TrackingSample; 3] = [
    TrackingSample {
        latitude: 19.0760,
        longitude: 72.8777,
        speed_kmh: 45.0,
    },
    TrackingSample {
        latitude: 18.9388,
        longitude: 73.1158,
        speed_kmh: 60.0,
    },
    TrackingSample {
        latitude: 18.5204,
        longitude: 73.8567,
        speed_kmh: 55.0,
    },
];

const LUXURY_AMENITIES: [&str; 5] = [
    "WiFi",
    "AC",
    "Reclining Seats",
    "Entertainment System",
    "USB Charging",
];

/// Database and index document counts from the sync status endpoint.
fn sync_counts(status: &Value) -> (u64, u64) {
    let count = |key: &str| status.get(key).and_then(Value::as_u64).unwrap_or(0);
    (count("databaseCount"), count("elasticsearchCount"))
}

impl<T: HttpTransport> ScenarioRunner<'_, T> {
    pub(super) async fn ingest_tracking(&mut self) {
        const STEP: &str = "Tracking Ingestion";
        if self.skip_if_missing(STEP, &[ContextKey::AdminToken, ContextKey::Bus]) {
            return;
        }
        let bus_id = self.ctx.id(ContextKey::Bus).unwrap_or_default();
        let token = self.token(ContextKey::AdminToken);

        let mut accepted = 0;
        let mut last_error = None;
        for (i, sample) in TRACKING_SAMPLES.iter().enumerate() {
            let update = TrackingUpdate {
                bus_id: bus_id.clone(),
                sample: *sample,
            };
            let response = self
                .client
                .post("/tracking/update", &update, token.as_deref())
                .await;
            if response.ok {
                accepted += 1;
            } else {
                warn!(sample = i + 1, message = %response.message, "Tracking sample rejected");
                last_error = Some(response.message);
            }
        }

        let total = TRACKING_SAMPLES.len();
        let detail = format!("{accepted}/{total} samples accepted");
        match (accepted, last_error) {
            (n, _) if n == total => self.record(STEP, OutcomeStatus::Pass, detail),
            (0, error) => self.record(
                STEP,
                OutcomeStatus::Fail,
                error.unwrap_or(detail),
            ),
            (_, Some(error)) => {
                self.record(STEP, OutcomeStatus::Partial, format!("{detail}, last error: {error}"))
            }
            (_, None) => self.record(STEP, OutcomeStatus::Partial, detail),
        }
    }

    pub(super) async fn current_location(&mut self) {
        const STEP: &str = "Bus Tracking - Current";
        if self.skip_if_missing(STEP, &[ContextKey::Bus]) {
            return;
        }
        let Some(id) = self.ctx.id_segment(ContextKey::Bus) else {
            self.record(STEP, OutcomeStatus::Fail, "Bus has no id");
            return;
        };
        let response = self
            .client
            .get(&format!("/tracking/bus/{id}/current"), None)
            .await;
        let detail = match (response.field("latitude"), response.field("longitude")) {
            (Some(lat), Some(lon)) => format!("At {lat}, {lon}"),
            _ => "No tracking data yet".to_string(),
        };
        self.record_response(STEP, &response, detail);
    }

    pub(super) async fn location_history(&mut self) {
        const STEP: &str = "Bus Tracking - History";
        if self.skip_if_missing(STEP, &[ContextKey::Bus]) {
            return;
        }
        let Some(id) = self.ctx.id_segment(ContextKey::Bus) else {
            self.record(STEP, OutcomeStatus::Fail, "Bus has no id");
            return;
        };
        let response = self
            .client
            .get(&format!("/tracking/bus/{id}/history"), None)
            .await;
        let count = response.items().len();
        self.record_response(STEP, &response, format!("{count} records"));
    }

    /// A second operator owning a luxury bus.
    pub(super) async fn premium_operator(&mut self) {
        const STEP: &str = "Advanced Operator Management";
        if self.skip_if_missing(STEP, &[ContextKey::AdminToken]) {
            return;
        }
        let tag = self.settings.run_tag.clone();
        let token = self.token(ContextKey::AdminToken);
        let operator = OperatorRequest {
            name: format!("Premium Bus Lines {tag}"),
            contact_email: format!("premium{tag}@buslines.com"),
            contact_phone: "+1-555-0456".to_string(),
            license_number: format!("PBL{tag}"),
        };
        let response = self
            .client
            .post("/operator/operators", &operator, token.as_deref())
            .await;
        let Some(operator_id) = response.field("id").cloned().filter(|_| response.ok) else {
            let detail = failure_detail(&response, "no operator id was returned");
            self.record(STEP, OutcomeStatus::Fail, detail);
            return;
        };
        self.ctx.set(
            ContextKey::PremiumOperator,
            response.body.clone().unwrap_or_default(),
        );

        let bus = BusRequest {
            operator_id: operator_id.clone(),
            bus_number: format!("PBL-LUXURY-{tag}"),
            bus_type: BusType::Luxury,
            total_seats: 32,
            amenities: LUXURY_AMENITIES.iter().map(|a| a.to_string()).collect(),
        };
        let response = self
            .client
            .post("/operator/buses", &bus, token.as_deref())
            .await;
        if response.ok_with("id") {
            self.ctx
                .set(ContextKey::PremiumBus, response.body.clone().unwrap_or_default());
            self.record(
                STEP,
                OutcomeStatus::Pass,
                format!(
                    "Operator {} with luxury bus {}",
                    display_id(Some(&operator_id)),
                    display_id(response.field("id"))
                ),
            );
        } else {
            let detail = failure_detail(&response, "no bus id was returned");
            self.record(
                STEP,
                OutcomeStatus::Partial,
                format!("Operator created, bus failed: {detail}"),
            );
        }
    }

    pub(super) async fn sync_status(&mut self) {
        const STEP: &str = "Data Sync Status";
        let response = self.client.get("/sync/status", None).await;
        match response.body.as_ref().filter(|_| response.ok) {
            Some(status) => {
                let (database, index) = sync_counts(status);
                if database == index {
                    info!(database, index, "Search index in sync");
                } else {
                    warn!(database, index, "Search index out of sync");
                }
                self.ctx.set(ContextKey::SyncStatus, status.clone());
                self.record(
                    STEP,
                    OutcomeStatus::Pass,
                    format!("DB: {database}, ES: {index}"),
                );
            }
            None => {
                let detail = failure_detail(&response, "no status was returned");
                self.record(STEP, OutcomeStatus::Fail, detail);
            }
        }
    }

    /// Trigger a resync according to the configured policy.
    ///
    /// Records nothing when no resync is wanted.
    pub(super) async fn manual_resync(&mut self) {
        const STEP: &str = "Manual Sync";
        let wanted = match self.settings.resync {
            ResyncPolicy::Never => false,
            ResyncPolicy::Always => true,
            ResyncPolicy::WhenDiverged => {
                if self.skip_if_missing(STEP, &[ContextKey::SyncStatus]) {
                    return;
                }
                let (database, index) = self
                    .ctx
                    .get(ContextKey::SyncStatus)
                    .map(sync_counts)
                    .unwrap_or_default();
                database != index
            }
        };
        if !wanted {
            info!(policy = ?self.settings.resync, "Manual resync not needed");
            return;
        }

        let token = self.token(ContextKey::AdminToken);
        let response = self
            .client
            .request::<Value>(HttpMethod::Post, "/sync/trigger", None, token.as_deref())
            .await;
        self.record_response(STEP, &response, "Sync triggered successfully");
    }
}
