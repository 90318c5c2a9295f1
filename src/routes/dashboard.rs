use std::collections::BTreeMap;

use axum::{
    extract::State,
    response::{IntoResponse, Json as AxumJson},
};
use chrono::Local;
use serde::Serialize;

use crate::AppState;
use crate::auth::{AuthenticatedUser, Role};
use crate::db::{self, models::{Activity, DonationStatus, FoodDonation}};
use crate::error::AppError;
use crate::market::{self, DonationView};
use crate::points::{Progress, DONATION_POINTS};

const RECENT_ACTIVITY: usize = 5;

/// Donor impact meters. Quantities are summed as listed, whatever their unit.
#[derive(Serialize, Debug, PartialEq)]
pub struct Impact {
    pub total_quantity: f64,
    pub meals_provided: u64,
    pub food_saved_kg: f64,
    pub co2_reduced_kg: u64,
}

impl Impact {
    pub fn from_donations(donations: &[FoodDonation]) -> Self {
        let total: f64 = donations.iter().map(|d| d.quantity).sum();
        Self {
            total_quantity: total,
            meals_provided: total.round() as u64,
            food_saved_kg: total,
            co2_reduced_kg: (total * 0.5).round() as u64,
        }
    }
}

#[derive(Serialize)]
pub struct DonorDashboard {
    pub total_donations: usize,
    pub points_earned: u64,
    #[serde(flatten)]
    pub impact: Impact,
    pub by_status: BTreeMap<DonationStatus, usize>,
    pub donations: Vec<DonationView>,
    pub recent_activity: Vec<Activity>,
    pub progress: Progress,
}

#[derive(Serialize)]
pub struct PartnerDashboard {
    pub active_claims: usize,
    pub delivered: usize,
    pub urgent_available: usize,
    pub claims: Vec<DonationView>,
    pub recent_activity: Vec<Activity>,
}

pub async fn donor_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_role(Role::Donor)?;

    let donations = db::list_donations_by_donor(&state.db, &user.id).await?;
    let recent_activity = db::list_activities(&state.db, &user.id, RECENT_ACTIVITY).await?;
    let balance = state.points.balance(&user.id).await;

    let mut by_status = BTreeMap::new();
    for d in &donations {
        *by_status.entry(d.status).or_insert(0) += 1;
    }

    Ok(AxumJson(DonorDashboard {
        total_donations: donations.len(),
        points_earned: donations.len() as u64 * DONATION_POINTS,
        impact: Impact::from_donations(&donations),
        by_status,
        donations: market::annotate(donations, Local::now().naive_local()),
        recent_activity,
        progress: Progress::from_points(balance),
    }))
}

pub async fn partner_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_role(Role::Partner)?;

    let now = Local::now().naive_local();
    let claims = db::list_donations_by_claimer(&state.db, &user.id).await?;
    let available = db::list_donations_by_status(&state.db, DonationStatus::Available).await?;
    let recent_activity = db::list_activities(&state.db, &user.id, RECENT_ACTIVITY).await?;

    Ok(AxumJson(PartnerDashboard {
        active_claims: claims.iter().filter(|d| d.status == DonationStatus::Claimed).count(),
        delivered: claims.iter().filter(|d| d.status == DonationStatus::Delivered).count(),
        urgent_available: available.iter().filter(|d| market::is_urgent(d, now)).count(),
        claims: market::annotate(claims, now),
        recent_activity,
    }))
}
