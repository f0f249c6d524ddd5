//! In-memory stand-in for the RedBus application API.
//!
//! Served through `MockTransport::with_handler`. Schedules become visible in
//! search only after `index_lag` further search calls, mimicking the search
//! index trailing the database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rbv_common::api::{ApiRequest, HttpMethod, MockTransport, RawResponse, TransportError};
use serde_json::{Value, json};

#[derive(Debug, Clone, Default)]
pub struct FakeOptions {
    /// Search calls after creation before a schedule is indexed.
    pub index_lag: u32,
    /// Accept bookings for seats that are already taken.
    pub accept_duplicate_bookings: bool,
    /// Paths answered with 503.
    pub failing_paths: Vec<String>,
    /// Cancel answers 200 but leaves the booking as it was.
    pub ignore_cancellation: bool,
    /// Booked-seat lookups still report seats of cancelled bookings.
    pub hold_cancelled_seats: bool,
    /// Booking creation answers without a `status` field.
    pub omit_initial_status: bool,
}

#[derive(Default)]
struct User {
    id: u64,
    username: String,
    password: String,
    role: String,
}

#[derive(Default)]
struct State {
    options: FakeOptions,
    next_id: u64,
    users: Vec<User>,
    operators: Vec<Value>,
    routes: Vec<Value>,
    buses: Vec<Value>,
    schedules: Vec<Value>,
    /// Schedule id -> search call count at which it becomes visible.
    indexed_at: HashMap<u64, u32>,
    search_calls: u32,
    bookings: Vec<Value>,
    tracking: HashMap<String, Vec<Value>>,
    cancel_calls: Vec<String>,
    sync_triggers: u32,
}

/// Handle to the fake's shared state.
#[derive(Clone)]
pub struct FakeRedBus {
    state: Arc<Mutex<State>>,
}

fn reply(status: u16, body: Value) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::json(status, &body))
}

fn error(status: u16, message: &str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(status, message))
}

fn id_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl FakeRedBus {
    pub fn new(options: FakeOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                options,
                next_id: 1,
                ..State::default()
            })),
        }
    }

    pub fn transport(&self) -> MockTransport {
        let state = self.state.clone();
        MockTransport::with_handler(move |request| state.lock().unwrap().handle(request))
    }

    pub fn schedule_count(&self) -> usize {
        self.state.lock().unwrap().schedules.len()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().cancel_calls.clone()
    }

    pub fn sync_triggers(&self) -> u32 {
        self.state.lock().unwrap().sync_triggers
    }

    pub fn active_bookings(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .bookings
            .iter()
            .filter(|b| b["status"] != "CANCELLED")
            .count()
    }
}

impl State {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn user_for(&self, request: &ApiRequest) -> Option<&User> {
        let token = request.token.as_deref()?;
        self.users
            .iter()
            .find(|u| format!("token-{}", u.username) == token)
    }

    fn handle(&mut self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        if self.options.failing_paths.iter().any(|p| p == &request.path) {
            return error(503, "Service Unavailable");
        }
        let body = request.body.clone().unwrap_or(Value::Null);
        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();

        match (request.method, segments.as_slice()) {
            (HttpMethod::Post, ["auth", "register"]) => self.register(&body),
            (HttpMethod::Post, ["auth", "login"]) => self.login(&body),
            (HttpMethod::Get, ["auth", "me"]) => match self.user_for(request) {
                Some(user) => reply(200, json!({"id": user.id, "username": user.username, "role": user.role})),
                None => error(401, "Unauthorized"),
            },
            (HttpMethod::Get, ["actuator", "health"]) => reply(200, json!({"status": "UP"})),
            (HttpMethod::Post, ["public", "search"]) => self.search(&body),
            (HttpMethod::Get, ["sync", "status"]) => reply(
                200,
                json!({
                    "databaseCount": self.schedules.len(),
                    "elasticsearchCount": self.indexed_count(),
                }),
            ),
            (HttpMethod::Post, ["sync", "trigger"]) => {
                self.sync_triggers += 1;
                let now = self.search_calls;
                self.indexed_at.values_mut().for_each(|at| *at = now);
                reply(200, json!({"message": "Sync completed"}))
            }
            (HttpMethod::Get, ["tracking", "bus", bus, kind]) => {
                let history = self.tracking.get(*bus).cloned().unwrap_or_default();
                match *kind {
                    "current" => reply(200, history.last().cloned().unwrap_or(Value::Null)),
                    "history" => reply(200, Value::Array(history)),
                    _ => error(404, "Not Found"),
                }
            }
            _ if self.user_for(request).is_none() => error(401, "Unauthorized"),
            (HttpMethod::Get, ["operator", kind]) => match self.collection(kind) {
                Some(items) => reply(200, Value::Array(items.clone())),
                None => error(404, "Not Found"),
            },
            (HttpMethod::Post, ["operator", kind]) => self.create(kind, body),
            (HttpMethod::Post, ["tracking", "update"]) => {
                let bus = id_str(&body["busId"]);
                self.tracking.entry(bus).or_default().push(body);
                reply(200, json!({"message": "Location updated"}))
            }
            (HttpMethod::Get, ["bookings", "schedule", schedule, "date", date, "booked-seats"]) => {
                reply(200, json!(self.booked_seats(schedule, date)))
            }
            (HttpMethod::Post, ["bookings"]) => self.book(request, body),
            (HttpMethod::Get, ["bookings", "user"]) => {
                let username = self.user_for(request).map(|u| u.username.clone());
                let mine: Vec<Value> = self
                    .bookings
                    .iter()
                    .filter(|b| b["username"].as_str() == username.as_deref())
                    .cloned()
                    .collect();
                reply(200, Value::Array(mine))
            }
            (HttpMethod::Get, ["bookings", id]) => match self.booking_mut(id) {
                Some(booking) => reply(200, booking.clone()),
                None => error(404, "Booking not found"),
            },
            (HttpMethod::Put, ["bookings", id, "cancel"]) => {
                self.cancel_calls.push(id.to_string());
                let ignore = self.options.ignore_cancellation;
                match self.booking_mut(id) {
                    Some(booking) => {
                        if !ignore {
                            booking["status"] = json!("CANCELLED");
                        }
                        reply(200, booking.clone())
                    }
                    None => error(404, "Booking not found"),
                }
            }
            _ => error(404, "Not Found"),
        }
    }

    fn register(&mut self, body: &Value) -> Result<RawResponse, TransportError> {
        let username = body["username"].as_str().unwrap_or_default().to_string();
        if self.users.iter().any(|u| u.username == username) {
            return error(409, "Username already exists");
        }
        let id = self.next_id();
        let user = User {
            id,
            username: username.clone(),
            password: body["password"].as_str().unwrap_or_default().to_string(),
            role: body["role"].as_str().unwrap_or("USER").to_string(),
        };
        let response = json!({
            "id": id,
            "username": username,
            "role": user.role,
            "token": format!("token-{username}"),
        });
        self.users.push(user);
        reply(201, response)
    }

    fn login(&self, body: &Value) -> Result<RawResponse, TransportError> {
        let found = self.users.iter().find(|u| {
            body["username"].as_str() == Some(u.username.as_str())
                && body["password"].as_str() == Some(u.password.as_str())
        });
        match found {
            Some(user) => reply(200, json!({"token": format!("token-{}", user.username)})),
            None => error(401, "Bad credentials"),
        }
    }

    fn collection(&self, kind: &str) -> Option<&Vec<Value>> {
        match kind {
            "operators" => Some(&self.operators),
            "routes" => Some(&self.routes),
            "buses" => Some(&self.buses),
            "schedules" => Some(&self.schedules),
            _ => None,
        }
    }

    fn create(&mut self, kind: &str, mut body: Value) -> Result<RawResponse, TransportError> {
        let id = self.next_id();
        body["id"] = json!(id);
        match kind {
            "operators" => self.operators.push(body.clone()),
            "routes" => self.routes.push(body.clone()),
            "buses" => self.buses.push(body.clone()),
            "schedules" => {
                let visible_at = self.search_calls + self.options.index_lag;
                self.indexed_at.insert(id, visible_at);
                self.schedules.push(body.clone());
            }
            _ => return error(404, "Not Found"),
        }
        reply(201, body)
    }

    fn indexed_count(&self) -> usize {
        self.indexed_at
            .values()
            .filter(|at| **at <= self.search_calls)
            .count()
    }

    fn find<'a>(items: &'a [Value], id: &Value) -> Option<&'a Value> {
        items.iter().find(|item| item["id"] == *id)
    }

    fn search(&mut self, body: &Value) -> Result<RawResponse, TransportError> {
        self.search_calls += 1;
        let mut offers = Vec::new();
        for schedule in &self.schedules {
            let id = schedule["id"].as_u64().unwrap_or_default();
            if self.indexed_at.get(&id).is_none_or(|at| *at > self.search_calls) {
                continue;
            }
            let (Some(route), Some(bus)) = (
                Self::find(&self.routes, &schedule["routeId"]),
                Self::find(&self.buses, &schedule["busId"]),
            ) else {
                continue;
            };
            if route["origin"] != body["origin"] || route["destination"] != body["destination"] {
                continue;
            }
            offers.push(json!({
                "scheduleId": id,
                "busId": bus["id"],
                "busNumber": bus["busNumber"],
                "busType": bus["busType"],
                "totalSeats": bus["totalSeats"],
                "origin": route["origin"],
                "destination": route["destination"],
                "departureTime": schedule["departureTime"],
                "price": schedule["price"],
            }));
        }
        reply(200, Value::Array(offers))
    }

    fn active_seats(&self, schedule: &str, date: &str) -> Vec<u64> {
        self.seats_where(schedule, date, |b| b["status"] != "CANCELLED")
    }

    fn seats_where(&self, schedule: &str, date: &str, keep: impl Fn(&Value) -> bool) -> Vec<u64> {
        self.bookings
            .iter()
            .filter(|b| keep(b))
            .filter(|b| id_str(&b["scheduleId"]) == schedule && b["travelDate"] == date)
            .flat_map(|b| {
                b["passengers"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| p["seatNumber"].as_u64())
            })
            .collect()
    }

    fn booked_seats(&self, schedule: &str, date: &str) -> Vec<u64> {
        let mut seats = if self.options.hold_cancelled_seats {
            self.seats_where(schedule, date, |_| true)
        } else {
            self.active_seats(schedule, date)
        };
        seats.sort_unstable();
        seats
    }

    fn book(&mut self, request: &ApiRequest, mut body: Value) -> Result<RawResponse, TransportError> {
        let schedule = id_str(&body["scheduleId"]);
        let date = body["travelDate"].as_str().unwrap_or_default().to_string();
        let taken = self.active_seats(&schedule, &date);
        let wanted: Vec<u64> = body["passengers"]
            .as_array()
            .map(|ps| ps.iter().filter_map(|p| p["seatNumber"].as_u64()).collect())
            .unwrap_or_default();
        if !self.options.accept_duplicate_bookings
            && let Some(seat) = wanted.iter().find(|s| taken.contains(s))
        {
            return error(409, &format!("Seat {seat} is already booked"));
        }

        let username = self.user_for(request).map(|u| u.username.clone());
        let id = self.next_id();
        body["id"] = json!(id);
        body["bookingReference"] = json!(format!("RB{id:06}"));
        body["status"] = json!("CONFIRMED");
        body["username"] = json!(username);
        self.bookings.push(body.clone());
        if self.options.omit_initial_status
            && let Some(fields) = body.as_object_mut()
        {
            fields.remove("status");
        }
        reply(201, body)
    }

    fn booking_mut(&mut self, id: &str) -> Option<&mut Value> {
        self.bookings.iter_mut().find(|b| id_str(&b["id"]) == id)
    }
}
