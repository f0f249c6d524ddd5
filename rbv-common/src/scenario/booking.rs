//! Regular-user booking lifecycle steps.

use serde_json::{Value, json};
use tracing::{info, warn};

use super::context::{ContextKey, path_segment};
use super::outcome::OutcomeStatus;
use super::seats::{DEFAULT_TOTAL_SEATS, choose_seats, parse_seat_list};
use super::{ScenarioRunner, display_id, failure_detail};
use crate::api::HttpTransport;
use crate::api::payloads::{
    BookingRequest, BookingStatus, Gender, Passenger, RegisterRequest, Role, SearchRequest,
};

const USER_PASSWORD: &str = "UserPass123!";

fn seat_list(seats: &[u32]) -> String {
    seats
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl<T: HttpTransport> ScenarioRunner<'_, T> {
    pub(super) async fn register_user(&mut self) {
        const STEP: &str = "Regular User Registration";
        let username = format!("user_test_{}", self.settings.run_tag);
        let request = RegisterRequest {
            email: format!("{username}@test.com"),
            username: username.clone(),
            password: USER_PASSWORD.to_string(),
            first_name: "John".to_string(),
            last_name: "Customer".to_string(),
            phone: Some("+1-555-0199".to_string()),
            role: Role::User,
        };

        let response = self.client.post("/auth/register", &request, None).await;
        match response.str_field("token") {
            Some(token) if response.ok => {
                self.ctx.set(ContextKey::UserToken, json!(token));
                self.ctx.set(
                    ContextKey::UserLogin,
                    json!({"username": username, "password": USER_PASSWORD}),
                );
                self.ctx
                    .set(ContextKey::RegularUser, response.body.clone().unwrap_or_default());
                let id = display_id(response.field("id"));
                self.record(STEP, OutcomeStatus::Pass, format!("User ID: {id}"));
            }
            _ => {
                let detail = failure_detail(&response, "no token was returned");
                self.record(STEP, OutcomeStatus::Fail, detail);
            }
        }
    }

    pub(super) async fn login_user(&mut self) {
        const STEP: &str = "Regular User Login";
        if self.skip_if_missing(STEP, &[ContextKey::UserLogin]) {
            return;
        }
        let Some(login) = self.login_request(ContextKey::UserLogin) else {
            self.record(STEP, OutcomeStatus::Fail, "Stored user credentials are malformed");
            return;
        };

        let response = self.client.post("/auth/login", &login, None).await;
        match response.str_field("token") {
            Some(token) if response.ok => {
                self.ctx.set(ContextKey::UserToken, json!(token));
                self.record(STEP, OutcomeStatus::Pass, "Token refreshed");
            }
            _ => {
                let detail = failure_detail(&response, "no token was returned");
                self.record(STEP, OutcomeStatus::Fail, detail);
            }
        }
    }

    /// Search the seeded route and keep the first offer.
    pub(super) async fn search_offers(&mut self) {
        const STEP: &str = "Enhanced Bus Search";
        if self.skip_if_missing(STEP, &[ContextKey::UserToken]) {
            return;
        }
        let request = SearchRequest {
            origin: self.settings.demo_origin.clone(),
            destination: self.settings.demo_destination.clone(),
            travel_date: self.settings.travel_date,
        };
        let token = self.token(ContextKey::UserToken);
        let response = self
            .client
            .post("/public/search", &request, token.as_deref())
            .await;

        if !response.ok {
            self.record(STEP, OutcomeStatus::Fail, response.message.clone());
            return;
        }
        let Some(offer) = response.items().first().cloned() else {
            self.record(
                STEP,
                OutcomeStatus::Fail,
                format!(
                    "No buses found for {} -> {} on {}",
                    request.origin, request.destination, request.travel_date
                ),
            );
            return;
        };

        let detail = format!(
            "Found {} buses, selected {} at {}",
            response.items().len(),
            offer["busNumber"].as_str().unwrap_or("?"),
            offer.get("price").map(Value::to_string).unwrap_or_else(|| "?".into()),
        );
        self.ctx.set(ContextKey::SelectedOffer, offer);
        self.record(STEP, OutcomeStatus::Pass, detail);
    }

    fn booked_seats_path(&self) -> Option<String> {
        let schedule = self
            .ctx
            .field(ContextKey::SelectedOffer, "scheduleId")
            .and_then(path_segment)?;
        Some(format!(
            "/bookings/schedule/{schedule}/date/{}/booked-seats",
            self.settings.travel_date
        ))
    }

    pub(super) async fn lookup_booked_seats(&mut self) {
        const STEP: &str = "Booked Seats Lookup";
        if self.skip_if_missing(STEP, &[ContextKey::SelectedOffer]) {
            return;
        }
        let Some(path) = self.booked_seats_path() else {
            self.record(STEP, OutcomeStatus::Fail, "Selected offer has no scheduleId");
            return;
        };
        let token = self.token(ContextKey::UserToken);
        let response = self.client.get(&path, token.as_deref()).await;
        if response.ok {
            let booked = parse_seat_list(response.items());
            let detail = format!("{} seats already booked", booked.len());
            self.ctx.set(ContextKey::BookedSeats, json!(booked));
            self.record(STEP, OutcomeStatus::Pass, detail);
        } else {
            self.record(STEP, OutcomeStatus::Fail, response.message.clone());
        }
    }

    pub(super) async fn create_booking(&mut self) {
        const STEP: &str = "Booking Creation";
        if self.skip_if_missing(STEP, &[ContextKey::UserToken, ContextKey::SelectedOffer]) {
            return;
        }
        let schedule_id = self
            .ctx
            .field(ContextKey::SelectedOffer, "scheduleId")
            .cloned()
            .unwrap_or_default();
        let total_seats = self
            .ctx
            .field(ContextKey::SelectedOffer, "totalSeats")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_TOTAL_SEATS);
        let booked = self
            .ctx
            .get(ContextKey::BookedSeats)
            .and_then(Value::as_array)
            .map(|items| parse_seat_list(items));

        let choice = choose_seats(total_seats, booked.as_deref(), 2, self.settings.seat_seed);
        info!(seats = ?choice.seats, strategy = ?choice.strategy, "Chose seats");

        let passengers = choice
            .seats
            .iter()
            .zip([("John Customer", 30, Gender::Male), ("Jane Customer", 28, Gender::Female)])
            .map(|(seat, (name, age, gender))| Passenger {
                seat_number: *seat,
                passenger_name: name.to_string(),
                passenger_age: age,
                passenger_gender: gender,
            })
            .collect();
        let request = BookingRequest {
            schedule_id,
            travel_date: self.settings.travel_date,
            passengers,
        };
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(e) => {
                self.record(STEP, OutcomeStatus::Fail, format!("Could not build booking: {e}"));
                return;
            }
        };

        let token = self.token(ContextKey::UserToken);
        let response = self.client.post("/bookings", &payload, token.as_deref()).await;
        if response.ok_with("id") {
            let detail = format!(
                "Booking ID: {}, Ref: {}, Seats: {}",
                display_id(response.field("id")),
                response.str_field("bookingReference").unwrap_or("?"),
                seat_list(&choice.seats),
            );
            self.ctx
                .set(ContextKey::Booking, response.body.clone().unwrap_or_default());
            self.ctx.set(ContextKey::BookingPayload, payload);
            self.ctx.set(ContextKey::SelectedSeats, json!(choice.seats));
            self.record(STEP, OutcomeStatus::Pass, detail);
        } else {
            let detail = failure_detail(&response, "no booking id was returned");
            self.record(STEP, OutcomeStatus::Fail, detail);
        }
    }

    fn booking_path(&self, suffix: &str) -> Option<String> {
        self.ctx
            .id_segment(ContextKey::Booking)
            .map(|id| format!("/bookings/{id}{suffix}"))
    }

    pub(super) async fn fetch_booking(&mut self) {
        const STEP: &str = "Booking Retrieval";
        if self.skip_if_missing(STEP, &[ContextKey::UserToken, ContextKey::Booking]) {
            return;
        }
        let Some(path) = self.booking_path("") else {
            self.record(STEP, OutcomeStatus::Fail, "Booking has no id");
            return;
        };
        let token = self.token(ContextKey::UserToken);
        let response = self.client.get(&path, token.as_deref()).await;
        let status = response.str_field("status").unwrap_or("?").to_string();
        self.record_response(STEP, &response, format!("Status: {status}"));
    }

    pub(super) async fn list_user_bookings(&mut self) {
        const STEP: &str = "User Booking History";
        if self.skip_if_missing(STEP, &[ContextKey::UserToken]) {
            return;
        }
        let token = self.token(ContextKey::UserToken);
        let response = self.client.get("/bookings/user", token.as_deref()).await;
        let count = response.items().len();
        self.record_response(STEP, &response, format!("Found: {count} bookings"));
    }

    /// The identical payload must be rejected as a seat conflict.
    pub(super) async fn resubmit_booking(&mut self) {
        const STEP: &str = "Seat Validation";
        if self.skip_if_missing(
            STEP,
            &[ContextKey::UserToken, ContextKey::BookingPayload],
        ) {
            return;
        }
        let payload = self
            .ctx
            .get(ContextKey::BookingPayload)
            .cloned()
            .unwrap_or_default();
        let token = self.token(ContextKey::UserToken);
        let response = self.client.post("/bookings", &payload, token.as_deref()).await;

        if !response.ok {
            self.record(
                STEP,
                OutcomeStatus::Pass,
                format!("Duplicate booking rejected ({})", response.message),
            );
            return;
        }

        self.record(
            STEP,
            OutcomeStatus::Fail,
            "Duplicate booking for already-booked seats was accepted",
        );
        if let Some(id) = response.field("id").and_then(path_segment) {
            let cleanup = self
                .client
                .put(&format!("/bookings/{id}/cancel"), token.as_deref())
                .await;
            if !cleanup.ok {
                warn!(booking = %id, message = %cleanup.message, "Could not cancel duplicate booking");
            }
        }
    }

    pub(super) async fn cancel_booking(&mut self) {
        const STEP: &str = "Booking Cancellation";
        if self.skip_if_missing(STEP, &[ContextKey::UserToken, ContextKey::Booking]) {
            return;
        }
        let Some(path) = self.booking_path("/cancel") else {
            self.record(STEP, OutcomeStatus::Fail, "Booking has no id");
            return;
        };
        let token = self.token(ContextKey::UserToken);
        let response = self.client.put(&path, token.as_deref()).await;
        if response.ok {
            let cancelled = response
                .body
                .clone()
                .filter(Value::is_object)
                .or_else(|| self.ctx.get(ContextKey::Booking).cloned())
                .unwrap_or_default();
            self.ctx.set(ContextKey::CancelledBooking, cancelled);
            self.record(STEP, OutcomeStatus::Pass, "Booking cancelled");
        } else {
            self.record(STEP, OutcomeStatus::Fail, response.message.clone());
        }
    }

    /// Re-fetch: the booking must have moved from an active state to cancelled.
    pub(super) async fn verify_cancellation(&mut self) {
        const STEP: &str = "Cancellation Status";
        if self.skip_if_missing(
            STEP,
            &[ContextKey::UserToken, ContextKey::Booking, ContextKey::CancelledBooking],
        ) {
            return;
        }
        let Some(path) = self.booking_path("") else {
            self.record(STEP, OutcomeStatus::Fail, "Booking has no id");
            return;
        };
        let before = self
            .ctx
            .field(ContextKey::Booking, "status")
            .and_then(Value::as_str)
            .map(BookingStatus::parse);
        let token = self.token(ContextKey::UserToken);
        let response = self.client.get(&path, token.as_deref()).await;
        if !response.ok {
            self.record(STEP, OutcomeStatus::Fail, response.message.clone());
            return;
        }

        let after = BookingStatus::parse(response.str_field("status").unwrap_or_default());
        match (before, after) {
            (Some(before), BookingStatus::Cancelled) if before.is_active() => self.record(
                STEP,
                OutcomeStatus::Pass,
                format!("{} -> CANCELLED", before.as_str()),
            ),
            (before, BookingStatus::Cancelled) => self.record(
                STEP,
                OutcomeStatus::Partial,
                format!(
                    "Now CANCELLED, but initial status was {}",
                    before.as_ref().map(BookingStatus::as_str).unwrap_or("not reported")
                ),
            ),
            (_, after) => self.record(
                STEP,
                OutcomeStatus::Fail,
                format!("Status after cancellation: {}", after.as_str()),
            ),
        }
    }

    /// Cancelled seats must no longer be reported as booked.
    pub(super) async fn verify_seat_release(&mut self) {
        const STEP: &str = "Seat Release";
        if self.skip_if_missing(
            STEP,
            &[
                ContextKey::SelectedOffer,
                ContextKey::SelectedSeats,
                ContextKey::CancelledBooking,
            ],
        ) {
            return;
        }
        let Some(path) = self.booked_seats_path() else {
            self.record(STEP, OutcomeStatus::Fail, "Selected offer has no scheduleId");
            return;
        };
        let ours = self
            .ctx
            .get(ContextKey::SelectedSeats)
            .and_then(Value::as_array)
            .map(|items| parse_seat_list(items))
            .unwrap_or_default();
        let token = self.token(ContextKey::UserToken);
        let response = self.client.get(&path, token.as_deref()).await;
        if !response.ok {
            self.record(STEP, OutcomeStatus::Fail, response.message.clone());
            return;
        }

        let booked = parse_seat_list(response.items());
        let held: Vec<u32> = ours.iter().copied().filter(|s| booked.contains(s)).collect();
        if held.is_empty() {
            self.record(
                STEP,
                OutcomeStatus::Pass,
                format!("Seats {} released", seat_list(&ours)),
            );
        } else {
            self.record(
                STEP,
                OutcomeStatus::Fail,
                format!("Seats still held after cancellation: {}", seat_list(&held)),
            );
        }
    }
}
