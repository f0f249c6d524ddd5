//! Admin identity and catalog steps.

use chrono::NaiveTime;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::context::ContextKey;
use super::outcome::OutcomeStatus;
use super::{ScenarioRunner, display_id, failure_detail};
use crate::api::HttpTransport;
use crate::api::payloads::{
    BusRequest, BusType, LoginRequest, OperatorRequest, RegisterRequest, Role, RouteRequest,
    ScheduleRequest, SearchRequest,
};
use crate::consistency::{field_equals, verify_eventually};
use crate::probes::AppHealth;

const ADMIN_PASSWORD: &str = "TestPass123!";
const TEST_BUS_AMENITIES: [&str; 4] = ["WiFi", "USB Charging", "Air Conditioning", "Reclining Seats"];

impl<T: HttpTransport> ScenarioRunner<'_, T> {
    /// Fatal on failure: every later step needs the admin token.
    pub(super) async fn register_admin(&mut self) -> Result<(), String> {
        const STEP: &str = "Admin Registration";
        let username = format!("admin_test_{}", self.settings.run_tag);
        let request = RegisterRequest {
            email: format!("{username}@test.com"),
            username: username.clone(),
            password: ADMIN_PASSWORD.to_string(),
            first_name: "Test".to_string(),
            last_name: "Admin".to_string(),
            phone: None,
            role: Role::Admin,
        };

        let response = self.client.post("/auth/register", &request, None).await;
        match response.str_field("token") {
            Some(token) if response.ok => {
                self.ctx.set(ContextKey::AdminToken, json!(token));
                self.ctx.set(
                    ContextKey::AdminLogin,
                    json!({"username": username, "password": ADMIN_PASSWORD}),
                );
                self.ctx
                    .set(ContextKey::AdminUser, response.body.clone().unwrap_or_default());
                let id = display_id(response.field("id"));
                self.record(STEP, OutcomeStatus::Pass, format!("User ID: {id}"));
                Ok(())
            }
            _ => {
                let reason = failure_detail(&response, "no token was returned");
                self.record(STEP, OutcomeStatus::Fail, reason.clone());
                Err(reason)
            }
        }
    }

    pub(super) async fn login_admin(&mut self) {
        const STEP: &str = "User Login";
        if self.skip_if_missing(STEP, &[ContextKey::AdminLogin]) {
            return;
        }
        let Some(login) = self.login_request(ContextKey::AdminLogin) else {
            self.record(STEP, OutcomeStatus::Fail, "Stored admin credentials are malformed");
            return;
        };

        let response = self.client.post("/auth/login", &login, None).await;
        if response.ok_with("token") {
            self.record(STEP, OutcomeStatus::Pass, "Authentication working");
        } else {
            let detail = failure_detail(&response, "no token was returned");
            self.record(STEP, OutcomeStatus::Fail, detail);
        }
    }

    pub(super) fn login_request(&self, key: ContextKey) -> Option<LoginRequest> {
        self.ctx
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub(super) async fn read_profile(&mut self) {
        const STEP: &str = "User Profile";
        if self.skip_if_missing(STEP, &[ContextKey::AdminToken]) {
            return;
        }
        let token = self.token(ContextKey::AdminToken);
        let response = self.client.get("/auth/me", token.as_deref()).await;
        let role = response.str_field("role").unwrap_or("unknown").to_string();
        self.record_response(STEP, &response, format!("Role: {role}"));
    }

    pub(super) async fn list_resource(&mut self, step: &str, path: &str) {
        if self.skip_if_missing(step, &[ContextKey::AdminToken]) {
            return;
        }
        let token = self.token(ContextKey::AdminToken);
        let response = self.client.get(path, token.as_deref()).await;
        let count = response.items().len();
        self.record_response(step, &response, format!("Found: {count}"));
    }

    /// POST with the admin token and store the created record under `store`.
    async fn create_entity<B: Serialize>(
        &mut self,
        step: &str,
        path: &str,
        body: &B,
        store: ContextKey,
    ) -> bool {
        let token = self.token(ContextKey::AdminToken);
        let response = self.client.post(path, body, token.as_deref()).await;
        if response.ok_with("id") {
            let id = display_id(response.field("id"));
            self.ctx.set(store, response.body.clone().unwrap_or_default());
            self.record(step, OutcomeStatus::Pass, format!("ID: {id}"));
            true
        } else {
            let detail = failure_detail(&response, "no id was returned");
            self.record(step, OutcomeStatus::Fail, detail);
            false
        }
    }

    pub(super) async fn create_operator(&mut self) {
        const STEP: &str = "Create Operator";
        if self.skip_if_missing(STEP, &[ContextKey::AdminToken]) {
            return;
        }
        let tag = &self.settings.run_tag;
        let request = OperatorRequest {
            name: format!("Test Bus Company {tag}"),
            contact_email: format!("contact{tag}@testbus.com"),
            contact_phone: "+1-555-0123".to_string(),
            license_number: format!("LIC{tag}"),
        };
        self.create_entity(STEP, "/operator/operators", &request, ContextKey::Operator)
            .await;
    }

    pub(super) async fn create_route(&mut self) {
        const STEP: &str = "Create Route";
        if self.skip_if_missing(STEP, &[ContextKey::AdminToken]) {
            return;
        }
        let tag = &self.settings.run_tag;
        let request = RouteRequest {
            origin: format!("City_A_{tag}"),
            destination: format!("City_B_{tag}"),
            distance_km: 250.5,
            estimated_duration_hours: 4.5,
        };
        self.create_entity(STEP, "/operator/routes", &request, ContextKey::Route)
            .await;
    }

    pub(super) async fn create_bus(&mut self) {
        const STEP: &str = "Create Bus";
        if self.skip_if_missing(STEP, &[ContextKey::AdminToken, ContextKey::Operator]) {
            return;
        }
        let request = BusRequest {
            operator_id: self.ctx.id(ContextKey::Operator).unwrap_or_default(),
            bus_number: format!("TEST-BUS-{}", self.settings.run_tag),
            bus_type: BusType::Ac,
            total_seats: 45,
            amenities: TEST_BUS_AMENITIES.iter().map(|a| a.to_string()).collect(),
        };
        self.create_entity(STEP, "/operator/buses", &request, ContextKey::Bus)
            .await;
    }

    pub(super) async fn create_schedule(&mut self) {
        const STEP: &str = "Create Schedule";
        if self.skip_if_missing(
            STEP,
            &[ContextKey::AdminToken, ContextKey::Bus, ContextKey::Route],
        ) {
            return;
        }
        let request = ScheduleRequest {
            bus_id: self.ctx.id(ContextKey::Bus).unwrap_or_default(),
            route_id: self.ctx.id(ContextKey::Route).unwrap_or_default(),
            departure_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            arrival_time: NaiveTime::from_hms_opt(12, 30, 0).unwrap_or_default(),
            price: 299.99,
            is_recurring: true,
            days_of_week: vec![1, 2, 3, 4, 5],
        };
        self.create_entity(STEP, "/operator/schedules", &request, ContextKey::Schedule)
            .await;
    }

    /// The new schedule must show up in public search within the deadline.
    pub(super) async fn verify_searchable(&mut self) {
        const STEP: &str = "Search Index Sync";
        if self.skip_if_missing(
            STEP,
            &[ContextKey::Schedule, ContextKey::Route, ContextKey::Bus],
        ) {
            return;
        }
        let tag = &self.settings.run_tag;
        let field = |key: &str, fallback: String| {
            self.ctx
                .field(ContextKey::Route, key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(fallback)
        };
        let request = SearchRequest {
            origin: field("origin", format!("City_A_{tag}")),
            destination: field("destination", format!("City_B_{tag}")),
            travel_date: self.settings.travel_date,
        };
        let bus_id = self.ctx.id(ContextKey::Bus).unwrap_or_default();
        let bus_number = self
            .ctx
            .field(ContextKey::Bus, "busNumber")
            .cloned()
            .unwrap_or_else(|| json!(format!("TEST-BUS-{tag}")));

        let client = self.client;
        let report = verify_eventually(
            STEP,
            &self.settings.consistency,
            || {
                let request = request.clone();
                async move {
                    let response = client.post("/public/search", &request, None).await;
                    if response.ok {
                        Ok(response.items().to_vec())
                    } else {
                        Err(response.message)
                    }
                }
            },
            |offer| field_equals(offer, "busId", &bus_id) || field_equals(offer, "busNumber", &bus_number),
            |progress| {
                debug!(
                    poll = progress.attempt,
                    elapsed_ms = progress.elapsed.as_millis() as u64,
                    "Waiting for search index"
                )
            },
        )
        .await;

        let secs = report.elapsed.as_secs_f64();
        let bus_label = bus_number.as_str().unwrap_or("test bus").to_string();
        if report.matched {
            self.record(
                STEP,
                OutcomeStatus::Pass,
                format!("{bus_label} searchable after {secs:.1}s ({} results)", report.observed),
            );
        } else if let Some(error) = report.last_error {
            self.record(STEP, OutcomeStatus::Fail, format!("Search failed: {error}"));
        } else {
            self.record(
                STEP,
                OutcomeStatus::Fail,
                format!(
                    "{bus_label} not yet indexed after {secs:.1}s ({} results)",
                    report.observed
                ),
            );
        }
    }

    pub(super) async fn public_search(&mut self) {
        const STEP: &str = "Public Search";
        let request = SearchRequest {
            origin: self.settings.demo_origin.clone(),
            destination: self.settings.demo_destination.clone(),
            travel_date: self.settings.travel_date,
        };
        let response = self.client.post("/public/search", &request, None).await;
        let count = response.items().len();
        self.record_response(STEP, &response, format!("Found: {count} buses"));
    }

    pub(super) async fn system_health(&mut self) {
        const STEP: &str = "System Health";
        let response = self.client.get("/actuator/health", None).await;
        if !response.ok {
            self.record(STEP, OutcomeStatus::Fail, response.message.clone());
            return;
        }
        let raw = response.str_field("status").unwrap_or_default();
        let status = AppHealth::parse(raw);
        let detail = format!("Status: {}", raw.to_ascii_uppercase());
        if status.is_healthy() {
            self.record(STEP, OutcomeStatus::Pass, detail);
        } else {
            self.record(STEP, OutcomeStatus::Fail, detail);
        }
    }
}
