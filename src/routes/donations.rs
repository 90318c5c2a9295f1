use axum::{
    extract::{State, Query, Json, Path},
    response::{IntoResponse, Json as AxumJson},
    http::StatusCode,
};
use chrono::{Local, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthenticatedUser;
use crate::db::{self, Transition};
use crate::db::models::{Activity, ActivityKind, ClaimDetails, Coordinates, DonationStatus, FoodDonation};
use crate::error::AppError;
use crate::market::{self, ClaimFilter, ClaimWindow, DonationFilter, DonationView};
use crate::points::DONATION_POINTS;

const DEFAULT_RECENT_LIMIT: usize = 5;
const DEFAULT_EXPIRATION_TIME: &str = "23:59";

#[derive(Deserialize)]
pub struct CreateDonationRequest {
    pub food_type: String,
    #[serde(default)]
    pub description: String,
    pub pickup_location: String,
    pub coordinates: Option<Coordinates>,
    pub quantity: f64,
    pub quantity_unit: Option<String>,
    #[serde(default)]
    pub nutrition_tags: Vec<String>,
    pub expiration_date: String, // YYYY-MM-DD
    pub expiration_time: Option<String>, // HH:MM
    pub donor_name: Option<String>,
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub claimed_by: Option<String>,
    pub pickup_date: String, // YYYY-MM-DD
    pub pickup_time: String, // HH:MM
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub food_type: Option<String>,
    pub urgent: Option<bool>,
    /// Comma-separated nutrition tags.
    pub tags: Option<String>,
    pub q: Option<String>,
    pub status: Option<String>,
}

impl ListParams {
    fn into_filter(self) -> Result<DonationFilter, AppError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<DonationStatus>().map_err(|e| AppError::validation("status", e))?),
        };

        Ok(DonationFilter {
            food_type: self.food_type,
            urgent_only: self.urgent.unwrap_or(false),
            nutrition_tags: self
                .tags
                .map(|raw| split_tags(&raw))
                .unwrap_or_default(),
            search: self.q,
            status,
        })
    }
}

#[derive(Deserialize)]
pub struct ClaimListParams {
    pub food_type: Option<String>,
    #[serde(default)]
    pub window: ClaimWindow,
}

#[derive(Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

fn split_tags(raw: &str) -> Vec<String> {
    let tags = raw.split(',').map(str::to_string).collect();
    normalize_tags(tags)
}

/// Trims, drops blanks and collapses duplicates while keeping first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(field, "expected YYYY-MM-DD"))
}

fn parse_time(field: &'static str, raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| AppError::validation(field, "expected HH:MM"))
}

fn required(field: &'static str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

fn build_donation(user: &AuthenticatedUser, req: CreateDonationRequest) -> Result<FoodDonation, AppError> {
    let food_type = required("food_type", &req.food_type)?;
    let pickup_location = required("pickup_location", &req.pickup_location)?;

    if !req.quantity.is_finite() || req.quantity <= 0.0 {
        return Err(AppError::validation("quantity", "must be a positive number"));
    }
    if let Some(coords) = &req.coordinates {
        if !coords.is_valid() {
            return Err(AppError::validation("coordinates", "latitude/longitude out of range"));
        }
    }

    let expiration_date = parse_date("expiration_date", &req.expiration_date)?;
    let expiration_time = parse_time(
        "expiration_time",
        req.expiration_time.as_deref().unwrap_or(DEFAULT_EXPIRATION_TIME),
    )?;

    let donor_name = req
        .donor_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .or_else(|| Some(user.name.trim().to_string()).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| "Anonymous".to_string());

    Ok(FoodDonation {
        id: Uuid::new_v4().to_string(),
        food_type,
        description: req.description.trim().to_string(),
        donor_id: user.id.clone(),
        donor_name,
        pickup_location,
        coordinates: req.coordinates,
        quantity: req.quantity,
        quantity_unit: req
            .quantity_unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "kg".to_string()),
        nutrition_tags: normalize_tags(req.nutrition_tags),
        expiration_date,
        expiration_time,
        status: DonationStatus::Available,
        claim: None,
        delivered_at: None,
        created_at: Utc::now(),
    })
}

/// Activity logging is best-effort: the listing or claim already succeeded.
async fn record_activity(state: &AppState, user_id: &str, kind: ActivityKind, description: String) {
    let activity = Activity {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind,
        description,
        created_at: Utc::now(),
    };
    if let Err(e) = db::log_activity(&state.db, &activity).await {
        tracing::warn!("Activity log failed: {}", e);
    }
}

fn transition_result(outcome: Transition) -> Result<FoodDonation, AppError> {
    match outcome {
        Transition::Applied(d) => Ok(d),
        Transition::NotFound => Err(AppError::NotFound("Donation")),
        Transition::Rejected(status) => Err(AppError::InvalidTransition(status)),
        Transition::NotClaimer => Err(AppError::Forbidden("Only the claiming partner can confirm delivery")),
    }
}

fn views(list: Vec<FoodDonation>) -> AxumJson<serde_json::Value> {
    let now = Local::now().naive_local();
    AxumJson(serde_json::json!({ "donations": market::annotate(list, now) }))
}

pub async fn create_donation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateDonationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let donation = build_donation(&user, req)?;
    db::add_donation(&state.db, &donation).await?;

    let points = state.points.award(&user.id, DONATION_POINTS).await;
    record_activity(
        &state,
        &user.id,
        ActivityKind::Donation,
        format!("Listed {} {} of {}", donation.quantity, donation.quantity_unit, donation.food_type),
    )
    .await;
    tracing::info!(donation_id = %donation.id, donor_id = %user.id, "donation listed");

    let view = DonationView::new(donation, Local::now().naive_local());
    Ok((
        StatusCode::CREATED,
        AxumJson(serde_json::json!({ "status": "created", "donation": view, "points": points })),
    ))
}

pub async fn list_donations(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = params.into_filter()?;
    let donations = db::list_donations(&state.db).await?;
    let now = Local::now().naive_local();
    let filtered = filter.apply(donations, now);
    Ok(AxumJson(serde_json::json!({ "donations": market::annotate(filtered, now) })))
}

pub async fn list_available(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let list = db::list_donations_by_status(&state.db, DonationStatus::Available).await?;
    Ok(views(list))
}

pub async fn list_claimed(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<ClaimListParams>,
) -> Result<impl IntoResponse, AppError> {
    let list = db::list_donations_by_status(&state.db, DonationStatus::Claimed).await?;
    let filter = ClaimFilter { food_type: params.food_type, window: params.window };
    Ok(views(filter.apply(list, Utc::now())))
}

pub async fn list_recent(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<RecentParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let list = db::list_recent_donations(&state.db, limit).await?;
    Ok(views(list))
}

pub async fn list_mine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let list = db::list_donations_by_donor(&state.db, &user.id).await?;
    Ok(views(list))
}

pub async fn get_donation(
    Path(id): Path<String>,
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let donation = db::get_donation(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound("Donation"))?;
    Ok(AxumJson(DonationView::new(donation, Local::now().naive_local())))
}

pub async fn claim_donation(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claimed_by = req
        .claimed_by
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| user.name.clone());
    let claim = ClaimDetails {
        claimed_by: required("claimed_by", &claimed_by)?,
        claimer_id: user.id.clone(),
        pickup_date: parse_date("pickup_date", &req.pickup_date)?,
        pickup_time: parse_time("pickup_time", &req.pickup_time)?,
        claimed_at: Utc::now(),
    };

    let donation = transition_result(db::claim_donation(&state.db, &id, &claim).await?)?;
    record_activity(
        &state,
        &user.id,
        ActivityKind::Claim,
        format!("Claimed {} from {}", donation.food_type, donation.donor_name),
    )
    .await;
    tracing::info!(donation_id = %id, claimer_id = %user.id, "donation claimed");

    Ok(AxumJson(DonationView::new(donation, Local::now().naive_local())))
}

pub async fn deliver_donation(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let outcome = db::deliver_donation(&state.db, &id, &user.id, Utc::now()).await?;
    let donation = transition_result(outcome)?;
    record_activity(
        &state,
        &user.id,
        ActivityKind::Delivery,
        format!("Delivered {} from {}", donation.food_type, donation.donor_name),
    )
    .await;
    tracing::info!(donation_id = %id, claimer_id = %user.id, "donation delivered");

    Ok(AxumJson(DonationView::new(donation, Local::now().naive_local())))
}
