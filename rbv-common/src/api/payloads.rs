//! Request bodies for the application API.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorRequest {
    pub name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub license_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    pub distance_km: f64,
    pub estimated_duration_hours: f64,
}

/// Bus classes accepted by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusType {
    Ac,
    NonAc,
    Sleeper,
    Luxury,
}

impl BusType {
    pub fn code(self) -> &'static str {
        match self {
            BusType::Ac => "AC",
            BusType::NonAc => "NON_AC",
            BusType::Sleeper => "SLEEPER",
            BusType::Luxury => "LUXURY",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusRequest {
    /// Identifier exactly as the API returned it.
    pub operator_id: Value,
    pub bus_number: String,
    pub bus_type: BusType,
    pub total_seats: u32,
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub bus_id: Value,
    pub route_id: Value,
    #[serde(with = "wire_time")]
    pub departure_time: NaiveTime,
    #[serde(with = "wire_time")]
    pub arrival_time: NaiveTime,
    pub price: f64,
    pub is_recurring: bool,
    /// ISO weekday numbers, Monday = 1.
    pub days_of_week: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub travel_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub seat_number: u32,
    pub passenger_name: String,
    pub passenger_age: u32,
    pub passenger_gender: Gender,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub schedule_id: Value,
    pub travel_date: NaiveDate,
    pub passengers: Vec<Passenger>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSample {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub bus_id: Value,
    #[serde(flatten)]
    pub sample: TrackingSample,
}

/// Booking lifecycle states reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Unknown(String),
}

impl BookingStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => BookingStatus::Pending,
            "CONFIRMED" => BookingStatus::Confirmed,
            "CANCELLED" => BookingStatus::Cancelled,
            "COMPLETED" => BookingStatus::Completed,
            other => BookingStatus::Unknown(other.to_string()),
        }
    }

    /// Only active bookings can be cancelled.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Unknown(raw) => raw,
        }
    }
}

/// `HH:MM:SS` times.
mod wire_time {
    use chrono::NaiveTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }
}
