use axum::{
    extract::{State, Path},
    response::{IntoResponse, Json as AxumJson},
};
use serde::Serialize;

use crate::AppState;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::points::{find_reward, Progress, Reward, REWARDS};

#[derive(Serialize)]
struct RewardEntry {
    #[serde(flatten)]
    reward: Reward,
    affordable: bool,
}

pub async fn get_points(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> impl IntoResponse {
    let balance = state.points.balance(&user.id).await;
    AxumJson(Progress::from_points(balance))
}

pub async fn list_rewards(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> impl IntoResponse {
    let balance = state.points.balance(&user.id).await;
    let rewards: Vec<RewardEntry> = REWARDS
        .iter()
        .map(|r| RewardEntry { reward: *r, affordable: balance >= r.cost })
        .collect();
    AxumJson(serde_json::json!({ "points": balance, "rewards": rewards }))
}

pub async fn redeem_reward(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let reward = find_reward(&id).ok_or(AppError::NotFound("Reward"))?;
    let remaining = state.points.redeem(&user.id, reward).await?;
    Ok(AxumJson(serde_json::json!({
        "status": "redeemed",
        "reward": reward,
        "points": remaining,
    })))
}
