use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::db::models::{DonationStatus, FoodDonation};
use super::urgency::is_urgent;

/// Predicates used by the browse and request views. Every field is optional;
/// an empty filter keeps everything.
#[derive(Debug, Clone, Default)]
pub struct DonationFilter {
    /// Case-insensitive substring of the food type.
    pub food_type: Option<String>,
    pub urgent_only: bool,
    /// Keep listings sharing at least one of these tags.
    pub nutrition_tags: Vec<String>,
    /// Case-insensitive substring of the food type or the pickup location.
    pub search: Option<String>,
    pub status: Option<DonationStatus>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl DonationFilter {
    pub fn matches(&self, donation: &FoodDonation, now: NaiveDateTime) -> bool {
        if let Some(query) = non_blank(&self.food_type) {
            if !contains_ci(&donation.food_type, query) {
                return false;
            }
        }

        if self.urgent_only && !is_urgent(donation, now) {
            return false;
        }

        if !self.nutrition_tags.is_empty()
            && !self.nutrition_tags.iter().any(|tag| donation.nutrition_tags.contains(tag))
        {
            return false;
        }

        if let Some(query) = non_blank(&self.search) {
            if !contains_ci(&donation.food_type, query) && !contains_ci(&donation.pickup_location, query) {
                return false;
            }
        }

        match self.status {
            Some(status) => donation.status == status,
            None => true,
        }
    }

    /// Keeps the input order.
    pub fn apply(&self, donations: Vec<FoodDonation>, now: NaiveDateTime) -> Vec<FoodDonation> {
        donations.into_iter().filter(|d| self.matches(d, now)).collect()
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClaimWindow {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl ClaimWindow {
    fn max_days(&self) -> Option<i64> {
        match self {
            ClaimWindow::All => None,
            ClaimWindow::Today => Some(0),
            ClaimWindow::Week => Some(7),
            ClaimWindow::Month => Some(30),
        }
    }
}

/// Filter over a partner's claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub food_type: Option<String>,
    pub window: ClaimWindow,
}

impl ClaimFilter {
    pub fn matches(&self, donation: &FoodDonation, now: DateTime<Utc>) -> bool {
        if let Some(query) = non_blank(&self.food_type) {
            if !contains_ci(&donation.food_type, query) {
                return false;
            }
        }

        let Some(max_days) = self.window.max_days() else {
            return true;
        };
        match &donation.claim {
            Some(claim) => (now - claim.claimed_at).num_days() <= max_days,
            None => false,
        }
    }

    pub fn apply(&self, donations: Vec<FoodDonation>, now: DateTime<Utc>) -> Vec<FoodDonation> {
        donations.into_iter().filter(|d| self.matches(d, now)).collect()
    }
}
