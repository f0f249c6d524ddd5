//! Seat selection for the booking step.

use serde::Serialize;

/// Used when the capacity of the chosen offer is unknown.
pub const DEFAULT_TOTAL_SEATS: u32 = 40;
/// Fallback picks start somewhere in this window.
const FALLBACK_FIRST: u32 = 10;
const FALLBACK_LAST: u32 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStrategy {
    /// Picked from seats known to be free.
    Disjoint,
    /// Booked set unknown or too full; consecutive seats from a seeded start.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatChoice {
    pub seats: Vec<u32>,
    pub strategy: SeatStrategy,
}

/// Choose `count` seats.
///
/// With a known booked set the result never overlaps it. The same `seed`
/// always yields the same seats.
pub fn choose_seats(total_seats: u32, booked: Option<&[u32]>, count: usize, seed: u64) -> SeatChoice {
    let mut rng = fastrand::Rng::with_seed(seed);

    if let Some(booked) = booked {
        let available: Vec<u32> = (1..=total_seats).filter(|s| !booked.contains(s)).collect();
        if available.len() >= count && count > 0 {
            let start = rng.usize(..available.len());
            let mut seats: Vec<u32> = (0..count)
                .map(|i| available[(start + i) % available.len()])
                .collect();
            seats.sort_unstable();
            return SeatChoice {
                seats,
                strategy: SeatStrategy::Disjoint,
            };
        }
    }

    let last = FALLBACK_LAST.min(total_seats.saturating_sub(count as u32)).max(1);
    let first = FALLBACK_FIRST.min(last);
    let start = rng.u32(first..=last);
    SeatChoice {
        seats: (0..count as u32).map(|i| start + i).collect(),
        strategy: SeatStrategy::Fallback,
    }
}

/// Seat numbers from a booked-seats response.
pub fn parse_seat_list(items: &[serde_json::Value]) -> Vec<u32> {
    items
        .iter()
        .filter_map(|v| v.as_u64())
        .filter_map(|n| u32::try_from(n).ok())
        .collect()
}
