//! Browse-side logic: filters over listings and expiry urgency. Everything
//! here is pure and takes `now` explicitly.

pub mod filter;
pub mod urgency;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::FoodDonation;

pub use filter::{ClaimFilter, ClaimWindow, DonationFilter};
pub use urgency::{hours_left, is_urgent, spoilage_risk, SpoilageRisk};

/// A listing annotated with its urgency at render time.
#[derive(Serialize, Debug, Clone)]
pub struct DonationView {
    #[serde(flatten)]
    pub donation: FoodDonation,
    pub urgent: bool,
    pub hours_left: i64,
    pub spoilage_risk: SpoilageRisk,
}

impl DonationView {
    pub fn new(donation: FoodDonation, now: NaiveDateTime) -> Self {
        let expires_at = donation.expires_at();
        Self {
            urgent: is_urgent(&donation, now),
            hours_left: hours_left(expires_at, now),
            spoilage_risk: spoilage_risk(expires_at, now),
            donation,
        }
    }
}

pub fn annotate(donations: Vec<FoodDonation>, now: NaiveDateTime) -> Vec<DonationView> {
    donations.into_iter().map(|d| DonationView::new(d, now)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::DonationStatus;
    use chrono::{NaiveDate, NaiveTime, Utc};

    pub fn donation(food_type: &str, tags: &[&str]) -> FoodDonation {
        FoodDonation {
            id: uuid::Uuid::new_v4().to_string(),
            food_type: food_type.to_string(),
            description: String::new(),
            donor_id: "donor-1".to_string(),
            donor_name: "Annapurna Kitchen".to_string(),
            pickup_location: "Sector 21, Noida".to_string(),
            coordinates: None,
            quantity: 5.0,
            quantity_unit: "kg".to_string(),
            nutrition_tags: tags.iter().map(|t| t.to_string()).collect(),
            expiration_date: NaiveDate::from_ymd_opt(2026, 12, 31).expect("valid date"),
            expiration_time: NaiveTime::from_hms_opt(23, 59, 0).expect("valid time"),
            status: DonationStatus::Available,
            claim: None,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn view_flattens_the_listing() {
        let now = NaiveDate::from_ymd_opt(2026, 12, 31)
            .and_then(|d| d.and_hms_opt(20, 0, 0))
            .expect("valid timestamp");
        let view = DonationView::new(donation("Bread", &["vegan"]), now);
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["food_type"], "Bread");
        assert_eq!(json["urgent"], true);
        assert_eq!(json["hours_left"], 4);
        assert_eq!(json["spoilage_risk"], "high");
        assert_eq!(json["status"], "available");
    }
}
