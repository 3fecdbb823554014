use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::loyalty::{self, NewReward};
use crate::error::AppError;
use crate::models::identity::Identity;
use crate::models::loyalty::{LoyaltyAccount, LoyaltyTransaction, Redemption, Reward};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/loyalty/me", get(my_account))
        .route("/loyalty/me/transactions", get(my_transactions))
        .route("/loyalty/rewards", post(create_reward).get(list_rewards))
        .route("/loyalty/rewards/:id/redeem", post(redeem_reward))
        .route("/loyalty/rewards/:id/deactivate", post(deactivate_reward))
        .route("/loyalty/grants/:user_id", post(grant_points))
}

#[derive(Deserialize)]
pub struct GrantRequest {
    pub amount: u64,
    pub reason: String,
}

async fn my_account(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Json<LoyaltyAccount> {
    Json(loyalty::account(&state, identity.user_id))
}

async fn my_transactions(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Json<Vec<LoyaltyTransaction>> {
    Json(loyalty::history(&state, identity.user_id))
}

async fn create_reward(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<NewReward>,
) -> Result<Json<Reward>, AppError> {
    loyalty::create_reward(&state, identity, payload).map(Json)
}

async fn list_rewards(State(state): State<Arc<AppState>>) -> Json<Vec<Reward>> {
    Json(loyalty::list_rewards(&state))
}

async fn redeem_reward(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(reward_id): Path<Uuid>,
) -> Result<Json<Redemption>, AppError> {
    loyalty::redeem_reward(&state, identity.user_id, reward_id).map(Json)
}

async fn deactivate_reward(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(reward_id): Path<Uuid>,
) -> Result<Json<Reward>, AppError> {
    loyalty::deactivate_reward(&state, identity, reward_id).map(Json)
}

async fn grant_points(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<GrantRequest>,
) -> Result<Json<LoyaltyTransaction>, AppError> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden("only admins can grant points".to_string()));
    }
    if payload.reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason cannot be empty".to_string()));
    }

    loyalty::earn(&state, user_id, payload.amount, payload.reason.trim(), None).map(Json)
}
