use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::db::models::FoodDonation;

/// Listings expiring within this window are urgent.
pub fn urgent_window() -> Duration {
    Duration::hours(24)
}

/// `expires_at - now <= 24h`. Both sides are host-local wall-clock times, so
/// listings that already expired are urgent too.
pub fn is_urgent(donation: &FoodDonation, now: NaiveDateTime) -> bool {
    donation.expires_at() - now <= urgent_window()
}

/// Whole hours until expiry, rounded half-up. Negative once expired.
pub fn hours_left(expires_at: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let seconds = (expires_at - now).num_seconds() as f64;
    (seconds / 3600.0 + 0.5).floor() as i64
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpoilageRisk {
    High,
    Medium,
    Low,
}

pub fn spoilage_risk(expires_at: NaiveDateTime, now: NaiveDateTime) -> SpoilageRisk {
    match hours_left(expires_at, now) {
        h if h <= 12 => SpoilageRisk::High,
        h if h <= 48 => SpoilageRisk::Medium,
        _ => SpoilageRisk::Low,
    }
}
