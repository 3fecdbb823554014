use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::deals::get_deal;
use crate::engine::tracking::{self, SessionInfo};
use crate::error::AppError;
use crate::models::identity::Identity;
use crate::models::tracking::{LocationPing, Position, TrackSummary};
use crate::state::AppState;

const DEFAULT_RECENT_PINGS: usize = 20;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/deals/:id/tracking",
            post(start_tracking).delete(stop_tracking),
        )
        .route("/deals/:id/locations", post(report_position))
        .route("/deals/:id/track", get(track_summary))
}

#[derive(Deserialize)]
pub struct TrackQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<SessionInfo>, AppError> {
    tracking::start_tracking(&state, identity, deal_id)
        .await
        .map(Json)
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<StopResponse>, AppError> {
    let deal = get_deal(&state, deal_id)?;
    if !identity.is_admin() && identity.user_id != deal.carrier_id {
        return Err(AppError::Forbidden(format!(
            "only the carrier of deal {deal_id} can stop tracking"
        )));
    }

    Ok(Json(StopResponse {
        stopped: tracking::stop_tracking(&state, deal_id),
    }))
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(deal_id): Path<Uuid>,
    Json(payload): Json<Position>,
) -> Result<Json<LocationPing>, AppError> {
    tracking::report_position(&state, identity, deal_id, payload).map(Json)
}

async fn track_summary(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(deal_id): Path<Uuid>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<TrackSummary>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_PINGS);
    tracking::track_summary(&state, identity, deal_id, limit).map(Json)
}
