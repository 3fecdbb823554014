use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::deals;
use crate::error::AppError;
use crate::models::deal::{Deal, DealStatus};
use crate::models::identity::Identity;
use crate::models::rating::{Rating, RatingSummary};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/deals", post(create_deal))
        .route("/deals/:id", get(get_deal))
        .route("/deals/:id/status", patch(update_deal_status))
        .route("/deals/:id/ratings", post(rate_deal))
        .route("/users/:id/ratings", get(rating_summary))
}

#[derive(Deserialize)]
pub struct CreateDealRequest {
    pub response_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DealStatus,
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub score: u8,
    pub comment: Option<String>,
}

async fn create_deal(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CreateDealRequest>,
) -> Result<Json<Deal>, AppError> {
    deals::create_deal(&state, identity, order_id, payload.response_id)
        .await
        .map(Json)
}

async fn get_deal(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Deal>, AppError> {
    deals::get_deal_for(&state, identity, id).map(Json)
}

async fn update_deal_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Deal>, AppError> {
    deals::transition_deal(&state, identity, id, payload.status)
        .await
        .map(Json)
}

async fn rate_deal(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<Rating>, AppError> {
    deals::rate(&state, identity, id, payload.score, payload.comment)
        .await
        .map(Json)
}

async fn rating_summary(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Json<RatingSummary> {
    Json(deals::rating_summary(&state, user_id))
}
