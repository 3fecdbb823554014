use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::kyc::{self, KycReview, KycSubmission};
use crate::error::AppError;
use crate::models::identity::Identity;
use crate::models::kyc::KycRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/kyc/submissions", post(submit))
        .route("/kyc/me", get(my_record))
        .route("/kyc/reviews/:user_id", post(review))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<KycSubmission>,
) -> Result<Json<KycRecord>, AppError> {
    kyc::submit(&state, identity, payload).map(Json)
}

async fn my_record(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<KycRecord>, AppError> {
    kyc::get_record(&state, identity.user_id).map(Json)
}

async fn review(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<KycReview>,
) -> Result<Json<KycRecord>, AppError> {
    kyc::review(&state, identity, user_id, payload).map(Json)
}
