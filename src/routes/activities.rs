use axum::{
    extract::{State, Query},
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::AuthenticatedUser;
use crate::db;
use crate::error::AppError;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Deserialize)]
pub struct ActivityParams {
    pub limit: Option<usize>,
}

pub async fn list_activities(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ActivityParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let activities = db::list_activities(&state.db, &user.id, limit).await?;
    Ok(AxumJson(serde_json::json!({ "activities": activities })))
}
