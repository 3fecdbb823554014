use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orders::{self, NewBid, NewOrder};
use crate::error::AppError;
use crate::models::bid::Bid;
use crate::models::identity::Identity;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/responses", post(submit_bid).get(list_bids))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    orders::create_order(&state, identity, payload).map(Json)
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    Json(orders::list_orders(&state, query.status))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    orders::get_order(&state, id).map(Json)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    orders::cancel_order(&state, identity, id).await.map(Json)
}

async fn submit_bid(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewBid>,
) -> Result<Json<Bid>, AppError> {
    orders::submit_bid(&state, identity, id, payload).await.map(Json)
}

async fn list_bids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, AppError> {
    orders::list_bids(&state, id).map(Json)
}
