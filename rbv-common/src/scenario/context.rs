//! Per-run store threading identifiers and tokens between steps.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Logical entities a step can produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKey {
    AdminToken,
    AdminLogin,
    AdminUser,
    Operator,
    Route,
    Bus,
    Schedule,
    UserToken,
    UserLogin,
    RegularUser,
    SelectedOffer,
    BookedSeats,
    SelectedSeats,
    Booking,
    BookingPayload,
    CancelledBooking,
    PremiumOperator,
    PremiumBus,
    SyncStatus,
}

impl ContextKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKey::AdminToken => "admin_token",
            ContextKey::AdminLogin => "admin_login",
            ContextKey::AdminUser => "admin_user",
            ContextKey::Operator => "operator",
            ContextKey::Route => "route",
            ContextKey::Bus => "bus",
            ContextKey::Schedule => "schedule",
            ContextKey::UserToken => "user_token",
            ContextKey::UserLogin => "user_login",
            ContextKey::RegularUser => "regular_user",
            ContextKey::SelectedOffer => "selected_offer",
            ContextKey::BookedSeats => "booked_seats",
            ContextKey::SelectedSeats => "selected_seats",
            ContextKey::Booking => "booking",
            ContextKey::BookingPayload => "booking_payload",
            ContextKey::CancelledBooking => "cancelled_booking",
            ContextKey::PremiumOperator => "premium_operator",
            ContextKey::PremiumBus => "premium_bus",
            ContextKey::SyncStatus => "sync_status",
        }
    }

    /// Tokens and credentials are never shown in reports.
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            ContextKey::AdminToken
                | ContextKey::UserToken
                | ContextKey::AdminLogin
                | ContextKey::UserLogin
        )
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest value per entity. Owned by one scenario run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    values: BTreeMap<ContextKey, Value>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite.
    pub fn set(&mut self, key: ContextKey, value: Value) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: ContextKey) -> Option<&Value> {
        self.values.get(&key)
    }

    pub fn contains(&self, key: ContextKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn str(&self, key: ContextKey) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Owned string value, for tokens passed across awaits.
    pub fn string(&self, key: ContextKey) -> Option<String> {
        self.str(key).map(str::to_string)
    }

    /// Named field of an entity record.
    pub fn field(&self, key: ContextKey, name: &str) -> Option<&Value> {
        self.get(key)
            .and_then(|v| v.get(name))
            .filter(|v| !v.is_null())
    }

    /// The entity's `id` field as the API returned it.
    pub fn id(&self, key: ContextKey) -> Option<Value> {
        self.field(key, "id").cloned()
    }

    /// The entity's `id` rendered for use in a URL path.
    pub fn id_segment(&self, key: ContextKey) -> Option<String> {
        self.field(key, "id").and_then(path_segment)
    }

    /// Keys from `required` that are not set, in the given order.
    pub fn missing(&self, required: &[ContextKey]) -> Vec<ContextKey> {
        required
            .iter()
            .copied()
            .filter(|key| !self.contains(*key))
            .collect()
    }

    /// Non-secret entries, for reports.
    pub fn public_entries(&self) -> impl Iterator<Item = (ContextKey, &Value)> {
        self.values
            .iter()
            .filter(|(key, _)| !key.is_secret())
            .map(|(key, value)| (*key, value))
    }
}

/// Render an identifier for a URL path.
pub fn path_segment(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
