use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::negotiation::{self, Acceptance, BoardView, Proposal};
use crate::error::AppError;
use crate::models::identity::Identity;
use crate::models::negotiation::Negotiation;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/negotiations", post(propose).get(board))
        .route("/negotiations/:id/accept", post(accept))
        .route("/negotiations/:id/reject", post(reject))
}

#[derive(Deserialize)]
pub struct BoardQuery {
    pub carrier_id: Option<Uuid>,
}

async fn propose(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<Proposal>,
) -> Result<Json<Negotiation>, AppError> {
    negotiation::propose(&state, identity, order_id, payload)
        .await
        .map(Json)
}

async fn board(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardView>, AppError> {
    negotiation::board_view(&state, identity, order_id, query.carrier_id).map(Json)
}

async fn accept(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Acceptance>, AppError> {
    negotiation::accept(&state, identity, id).await.map(Json)
}

async fn reject(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Negotiation>, AppError> {
    negotiation::reject(&state, identity, id).await.map(Json)
}
