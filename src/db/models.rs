use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, DateTime, Utc};

/// Lifecycle of a listing. Only `available → claimed → delivered` and
/// `available → expired` are legal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Available,
    Claimed,
    Expired,
    Delivered,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Available => "available",
            DonationStatus::Claimed => "claimed",
            DonationStatus::Expired => "expired",
            DonationStatus::Delivered => "delivered",
        }
    }

    pub fn can_transition_to(self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (DonationStatus::Available, DonationStatus::Claimed)
                | (DonationStatus::Available, DonationStatus::Expired)
                | (DonationStatus::Claimed, DonationStatus::Delivered)
        )
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(DonationStatus::Available),
            "claimed" => Ok(DonationStatus::Claimed),
            "expired" => Ok(DonationStatus::Expired),
            "delivered" => Ok(DonationStatus::Delivered),
            other => Err(format!("unknown donation status: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClaimDetails {
    pub claimed_by: String,
    pub claimer_id: String,
    pub pickup_date: NaiveDate,
    pub pickup_time: NaiveTime,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FoodDonation {
    pub id: String,
    pub food_type: String,
    pub description: String,
    pub donor_id: String,
    pub donor_name: String,
    pub pickup_location: String,
    pub coordinates: Option<Coordinates>,
    pub quantity: f64,
    pub quantity_unit: String,
    pub nutrition_tags: Vec<String>,
    pub expiration_date: NaiveDate,
    pub expiration_time: NaiveTime,
    pub status: DonationStatus,
    pub claim: Option<ClaimDetails>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FoodDonation {
    /// Host-local wall-clock expiry.
    pub fn expires_at(&self) -> NaiveDateTime {
        self.expiration_date.and_time(self.expiration_time)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Donation,
    Claim,
    Delivery,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Donation => "donation",
            ActivityKind::Claim => "claim",
            ActivityKind::Delivery => "delivery",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donation" => Ok(ActivityKind::Donation),
            "claim" => Ok(ActivityKind::Claim),
            "delivery" => Ok(ActivityKind::Delivery),
            other => Err(format!("unknown activity kind: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
