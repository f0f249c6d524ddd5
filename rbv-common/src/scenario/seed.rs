//! Baseline demo data for a freshly started stack.

use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::payloads::{
    BusRequest, BusType, LoginRequest, OperatorRequest, RegisterRequest, Role, RouteRequest,
    ScheduleRequest,
};
use crate::api::{ApiClient, ApiResponse, HttpTransport};

pub const DEMO_ADMIN_USERNAME: &str = "demo_admin";
pub const DEMO_ADMIN_PASSWORD: &str = "Admin@123";

const OPERATORS: [(&str, &str, &str, &str); 2] = [
    (
        "RedBus Express",
        "contact@redbusexpress.com",
        "+1-800-REDBUS-1",
        "RBE2025001",
    ),
    (
        "Premium Travels",
        "info@premiumtravels.com",
        "+1-800-PREMIUM",
        "PT2025002",
    ),
];

const ROUTES: [(&str, &str, f64, f64); 4] = [
    ("Mumbai", "Pune", 150.0, 3.5),
    ("Mumbai", "Bangalore", 980.0, 16.0),
    ("Delhi", "Jaipur", 280.0, 5.0),
    ("Chennai", "Bangalore", 350.0, 6.0),
];

const BUS_TYPES: [BusType; 4] = [BusType::Ac, BusType::NonAc, BusType::Sleeper, BusType::Luxury];
const BUSES_PER_OPERATOR: usize = 2;
const SCHEDULED_BUSES: usize = 4;
const SCHEDULED_ROUTES: usize = 2;
const BASE_PRICE: f64 = 299.99;
const PRICE_STEP: f64 = 50.0;

/// Counts of entities created by a seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub operators: usize,
    pub routes: usize,
    pub buses: usize,
    pub schedules: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SeedOutcome {
    Seeded(SeedSummary),
    /// The demo admin already exists and can log in.
    AlreadySeeded,
    Failed(String),
}

/// Bus number for the `bus`th bus of the `operator`th operator, both 0-based.
pub fn bus_number(operator_name: &str, bus_type: BusType, operator: usize, bus: usize) -> String {
    let prefix: String = operator_name.chars().take(3).collect::<String>().to_uppercase();
    format!("{prefix}-{}-{}{}", bus_type.code(), operator + 1, bus + 1)
}

fn looks_like_conflict(response: &ApiResponse) -> bool {
    response.status == Some(409) || response.message.to_ascii_lowercase().contains("exist")
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

/// Create the demo admin, operators, routes, buses and schedules.
///
/// Individual entity failures are logged and skipped. Only a demo admin that
/// can neither register nor log in fails the pass. Never returns an error.
pub async fn seed_baseline<T: HttpTransport>(client: &ApiClient<T>, settle: Duration) -> SeedOutcome {
    info!("Seeding baseline demo data");
    let register = RegisterRequest {
        username: DEMO_ADMIN_USERNAME.to_string(),
        email: "admin@redbus.com".to_string(),
        password: DEMO_ADMIN_PASSWORD.to_string(),
        first_name: "Demo".to_string(),
        last_name: "Admin".to_string(),
        phone: None,
        role: Role::Admin,
    };
    let response = client.post("/auth/register", &register, None).await;
    let token = match response.str_field("token") {
        Some(token) if response.ok => token.to_string(),
        _ if looks_like_conflict(&response) => {
            let login = LoginRequest {
                username: DEMO_ADMIN_USERNAME.to_string(),
                password: DEMO_ADMIN_PASSWORD.to_string(),
            };
            let login = client.post("/auth/login", &login, None).await;
            if login.ok_with("token") {
                info!("Demo admin already exists, skipping seeding");
                return SeedOutcome::AlreadySeeded;
            }
            return SeedOutcome::Failed(format!(
                "demo admin exists but cannot log in: {}",
                login.message
            ));
        }
        _ => return SeedOutcome::Failed(response.message),
    };
    let token = Some(token.as_str());

    let mut summary = SeedSummary::default();

    let mut operators = Vec::new();
    for (name, email, phone, license) in OPERATORS {
        let request = OperatorRequest {
            name: name.to_string(),
            contact_email: email.to_string(),
            contact_phone: phone.to_string(),
            license_number: license.to_string(),
        };
        if let Some(created) = create(client, token, "/operator/operators", &request).await {
            operators.push(created);
        }
    }
    summary.operators = operators.len();

    let mut routes = Vec::new();
    for (origin, destination, distance_km, hours) in ROUTES {
        let request = RouteRequest {
            origin: origin.to_string(),
            destination: destination.to_string(),
            distance_km,
            estimated_duration_hours: hours,
        };
        if let Some(created) = create(client, token, "/operator/routes", &request).await {
            routes.push(created);
        }
    }
    summary.routes = routes.len();

    let mut buses = Vec::new();
    for (i, operator) in operators.iter().enumerate() {
        let name = operator["name"].as_str().unwrap_or_default();
        for j in 0..BUSES_PER_OPERATOR {
            let bus_type = BUS_TYPES[j % BUS_TYPES.len()];
            let even = j % 2 == 0;
            let amenities: &[&str] = if even {
                &["WiFi", "USB Charging", "Water"]
            } else {
                &["WiFi", "AC", "Entertainment"]
            };
            let request = BusRequest {
                operator_id: operator["id"].clone(),
                bus_number: bus_number(name, bus_type, i, j),
                bus_type,
                total_seats: if even { 40 } else { 45 },
                amenities: amenities.iter().map(|a| a.to_string()).collect(),
            };
            if let Some(created) = create(client, token, "/operator/buses", &request).await {
                buses.push(created);
            }
        }
    }
    summary.buses = buses.len();

    for bus in buses.iter().take(SCHEDULED_BUSES) {
        for route in routes.iter().take(SCHEDULED_ROUTES) {
            let morning = summary.schedules % 2 == 0;
            let request = ScheduleRequest {
                bus_id: bus["id"].clone(),
                route_id: route["id"].clone(),
                departure_time: if morning { time(6, 0) } else { time(14, 0) },
                arrival_time: if morning { time(9, 30) } else { time(17, 30) },
                price: BASE_PRICE + PRICE_STEP * summary.schedules as f64,
                is_recurring: true,
                days_of_week: (1..=7).collect(),
            };
            if create(client, token, "/operator/schedules", &request).await.is_some() {
                summary.schedules += 1;
            }
        }
    }

    info!(
        operators = summary.operators,
        routes = summary.routes,
        buses = summary.buses,
        schedules = summary.schedules,
        settle_secs = settle.as_secs(),
        "Baseline data created, waiting for index sync"
    );
    tokio::time::sleep(settle).await;
    SeedOutcome::Seeded(summary)
}

/// POST one entity, returning the created record.
async fn create<T: HttpTransport, B: Serialize>(
    client: &ApiClient<T>,
    token: Option<&str>,
    path: &str,
    body: &B,
) -> Option<Value> {
    let response = client.post(path, body, token).await;
    if response.ok_with("id") {
        response.body
    } else {
        warn!(path, message = %response.message, "Seed entity not created");
        None
    }
}
