use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::engine::loyalty::earn;
use crate::error::AppError;
use crate::models::deal::Deal;
use crate::models::loyalty::LoyaltyTransaction;
use crate::state::AppState;

pub const DEAL_COMPLETED_REASON: &str = "deal_completed";

pub async fn enqueue_completed_deal(state: &AppState, deal: Deal) -> Result<(), AppError> {
    state
        .completed_deals_tx
        .send(deal)
        .await
        .map_err(|err| AppError::Internal(format!("rewards queue send failed: {err}")))?;

    state.metrics.rewards_queue_depth.inc();
    Ok(())
}

pub async fn run_reward_engine(state: Arc<AppState>, mut deal_rx: mpsc::Receiver<Deal>) {
    info!("reward engine started");

    while let Some(deal) = deal_rx.recv().await {
        state.metrics.rewards_queue_depth.dec();

        match award_for_deal(&state, &deal) {
            Ok(awarded) if awarded.is_empty() => {
                info!(deal_id = %deal.id, "deal below the points threshold; nothing awarded");
            }
            Ok(awarded) => {
                info!(deal_id = %deal.id, awards = awarded.len(), "loyalty points awarded");
            }
            Err(err) => {
                error!(deal_id = %deal.id, error = %err, "failed to award loyalty points");
            }
        }
    }

    warn!("reward engine stopped: queue channel closed");
}

/// Points for both parties of a delivered deal, one point per
/// `loyalty_points_divisor` units of the agreed price.
pub fn award_for_deal(state: &AppState, deal: &Deal) -> Result<Vec<LoyaltyTransaction>, AppError> {
    let points = deal.agreed_price / state.config.loyalty_points_divisor.max(1);
    if points == 0 {
        return Ok(Vec::new());
    }

    let mut awarded = Vec::with_capacity(2);
    for user_id in [deal.client_id, deal.carrier_id] {
        awarded.push(earn(state, user_id, points, DEAL_COMPLETED_REASON, Some(deal.id))?);
    }
    Ok(awarded)
}
