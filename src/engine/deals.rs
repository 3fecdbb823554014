use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::feed::publish;
use crate::engine::rewards::enqueue_completed_deal;
use crate::engine::tracking::stop_tracking;
use crate::error::AppError;
use crate::models::change::{Change, ChangeKind};
use crate::models::deal::{Deal, DealStatus};
use crate::models::identity::Identity;
use crate::models::negotiation::NegotiationStatus;
use crate::models::order::OrderStatus;
use crate::models::rating::{Rating, RatingSummary};
use crate::state::AppState;

pub fn get_deal(state: &AppState, deal_id: Uuid) -> Result<Deal, AppError> {
    state
        .deals
        .get(&deal_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("deal {deal_id} not found")))
}

/// Deal visible only to its two parties and admins.
pub fn get_deal_for(state: &AppState, identity: Identity, deal_id: Uuid) -> Result<Deal, AppError> {
    let deal = get_deal(state, deal_id)?;
    if !identity.is_admin() && !deal.is_participant(identity.user_id) {
        return Err(AppError::Forbidden(format!(
            "caller is not a party to deal {deal_id}"
        )));
    }
    Ok(deal)
}

/// The client picks a response; its current price becomes the agreed price.
pub async fn create_deal(
    state: &AppState,
    identity: Identity,
    order_id: Uuid,
    response_id: Uuid,
) -> Result<Deal, AppError> {
    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let mut order = state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if !identity.is_admin() && identity.user_id != order.client_id {
        return Err(AppError::Forbidden(
            "only the order's client can pick a carrier".to_string(),
        ));
    }
    if order.status != OrderStatus::Open {
        return Err(AppError::Conflict(format!("order {order_id} is not open")));
    }

    let bid = state
        .bids
        .get(&response_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("response {response_id} not found")))?;
    if bid.order_id != order_id {
        return Err(AppError::BadRequest(format!(
            "response {response_id} belongs to another order"
        )));
    }

    let has_live_deal = state.deals.iter().any(|entry| {
        entry.value().order_id == order_id && entry.value().status != DealStatus::Cancelled
    });
    if has_live_deal {
        return Err(AppError::Conflict(format!(
            "order {order_id} already has a deal"
        )));
    }

    // A price already agreed with this carrier outranks the bid's own price.
    let agreed_price = state
        .negotiations
        .iter()
        .filter(|entry| {
            let negotiation = entry.value();
            negotiation.order_id == order_id
                && negotiation.carrier_id == bid.carrier_id
                && negotiation.status == NegotiationStatus::Accepted
        })
        .max_by_key(|entry| entry.value().updated_at)
        .map(|entry| entry.value().price)
        .unwrap_or(bid.price);

    let now = Utc::now();
    let deal = Deal {
        id: Uuid::new_v4(),
        order_id,
        response_id,
        client_id: order.client_id,
        carrier_id: bid.carrier_id,
        agreed_price,
        status: DealStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    order.status = OrderStatus::InProgress;
    order.updated_at = now;

    state.deals.insert(deal.id, deal.clone());
    state.orders.insert(order.id, order.clone());

    publish(state, ChangeKind::Insert, Change::Deal(deal.clone()));
    publish(state, ChangeKind::Update, Change::Order(order));
    info!(deal_id = %deal.id, %order_id, carrier_id = %deal.carrier_id, agreed_price = deal.agreed_price, "deal created");

    Ok(deal)
}

/// Moves a deal along its lifecycle and keeps the order in step. Progress
/// states are set by the carrier; either party may cancel.
pub async fn transition_deal(
    state: &AppState,
    identity: Identity,
    deal_id: Uuid,
    next: DealStatus,
) -> Result<Deal, AppError> {
    let order_id = get_deal(state, deal_id)?.order_id;

    let lock = state.order_lock(order_id);
    let guard = lock.lock().await;

    let mut deal = get_deal_for(state, identity, deal_id)?;

    let carrier_only = matches!(
        next,
        DealStatus::Accepted | DealStatus::InTransit | DealStatus::Delivered
    );
    if carrier_only && !identity.is_admin() && identity.user_id != deal.carrier_id {
        return Err(AppError::Forbidden(format!(
            "only the carrier can move deal {deal_id} to {next:?}"
        )));
    }

    if !deal.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "deal {deal_id} cannot move from {:?} to {next:?}",
            deal.status
        )));
    }

    let now = Utc::now();
    deal.status = next;
    deal.updated_at = now;
    state.deals.insert(deal.id, deal.clone());
    publish(state, ChangeKind::Update, Change::Deal(deal.clone()));

    let order_status = match next {
        DealStatus::Delivered => Some(OrderStatus::Completed),
        DealStatus::Cancelled => {
            let other_live = state.deals.iter().any(|entry| {
                entry.value().order_id == order_id
                    && entry.value().id != deal_id
                    && !entry.value().status.is_terminal()
            });
            (!other_live).then_some(OrderStatus::Open)
        }
        _ => None,
    };

    if let Some(status) = order_status {
        let updated = state.orders.get_mut(&order_id).and_then(|mut order| {
            if order.status.is_terminal() {
                return None;
            }
            order.status = status;
            order.updated_at = now;
            Some(order.clone())
        });
        if let Some(order) = updated {
            publish(state, ChangeKind::Update, Change::Order(order));
        }
    }

    if next.is_terminal() {
        stop_tracking(state, deal_id);
    }

    drop(guard);

    info!(%deal_id, %order_id, status = ?next, "deal status changed");

    if next == DealStatus::Delivered {
        // The delivery is committed either way; a missed award is only logged.
        if let Err(err) = enqueue_completed_deal(state, deal.clone()).await {
            error!(%deal_id, error = %err, "failed to queue loyalty award");
        }
    }

    Ok(deal)
}

pub async fn rate(
    state: &AppState,
    identity: Identity,
    deal_id: Uuid,
    score: u8,
    comment: Option<String>,
) -> Result<Rating, AppError> {
    if !(1..=5).contains(&score) {
        return Err(AppError::BadRequest("score must be between 1 and 5".to_string()));
    }

    let deal = get_deal(state, deal_id)?;
    if !deal.is_participant(identity.user_id) {
        return Err(AppError::Forbidden(format!(
            "caller is not a party to deal {deal_id}"
        )));
    }

    let lock = state.order_lock(deal.order_id);
    let _guard = lock.lock().await;

    let deal = get_deal(state, deal_id)?;
    if deal.status != DealStatus::Delivered {
        return Err(AppError::Conflict(format!(
            "deal {deal_id} can be rated only after delivery"
        )));
    }

    let already_rated = state.ratings.iter().any(|entry| {
        entry.value().deal_id == deal_id && entry.value().rater_id == identity.user_id
    });
    if already_rated {
        return Err(AppError::Conflict(format!(
            "caller already rated deal {deal_id}"
        )));
    }

    let rating = Rating {
        id: Uuid::new_v4(),
        deal_id,
        rater_id: identity.user_id,
        ratee_id: deal.other_party(identity.user_id),
        score,
        comment: comment.filter(|c| !c.trim().is_empty()),
        created_at: Utc::now(),
    };

    state.ratings.insert(rating.id, rating.clone());
    info!(%deal_id, rater_id = %rating.rater_id, ratee_id = %rating.ratee_id, score, "deal rated");

    Ok(rating)
}

pub fn rating_summary(state: &AppState, user_id: Uuid) -> RatingSummary {
    let scores: Vec<u8> = state
        .ratings
        .iter()
        .filter(|entry| entry.value().ratee_id == user_id)
        .map(|entry| entry.value().score)
        .collect();

    let average = if scores.is_empty() {
        None
    } else {
        let total: u32 = scores.iter().map(|&s| u32::from(s)).sum();
        Some(f64::from(total) / scores.len() as f64)
    };

    RatingSummary {
        user_id,
        count: scores.len(),
        average,
    }
}

#[cfg(test)]
mod tests {
    use super::{create_deal, rate, rating_summary, transition_deal};
    use crate::config::Config;
    use crate::engine::negotiation::tests::fixture;
    use crate::engine::negotiation::{accept, propose, Proposal};
    use crate::error::AppError;
    use crate::models::deal::DealStatus;
    use crate::models::order::OrderStatus;

    #[tokio::test]
    async fn delivery_completes_the_order() {
        let f = fixture(Config::default());
        for next in [DealStatus::Accepted, DealStatus::InTransit, DealStatus::Delivered] {
            transition_deal(&f.state, f.carrier, f.deal_id, next).await.unwrap();
        }

        assert_eq!(
            f.state.orders.get(&f.order_id).unwrap().status,
            OrderStatus::Completed
        );
    }

    #[tokio::test]
    async fn client_cannot_mark_delivery_progress() {
        let f = fixture(Config::default());
        let result = transition_deal(&f.state, f.client, f.deal_id, DealStatus::Accepted).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn skipping_states_is_a_conflict() {
        let f = fixture(Config::default());
        let result = transition_deal(&f.state, f.carrier, f.deal_id, DealStatus::Delivered).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn cancelling_the_only_deal_reopens_the_order() {
        let f = fixture(Config::default());
        transition_deal(&f.state, f.client, f.deal_id, DealStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(f.state.orders.get(&f.order_id).unwrap().status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn new_deal_keeps_the_price_accepted_before_it() {
        let f = fixture(Config::default());
        transition_deal(&f.state, f.client, f.deal_id, DealStatus::Cancelled)
            .await
            .unwrap();

        let offer = Proposal {
            response_id: None,
            price: 110_000,
            message: Some("empty run back anyway".to_string()),
        };
        let negotiation = propose(&f.state, f.carrier, f.order_id, offer).await.unwrap();
        accept(&f.state, f.client, negotiation.id).await.unwrap();

        let deal = create_deal(&f.state, f.client, f.order_id, f.bid_id)
            .await
            .unwrap();
        assert_eq!(deal.agreed_price, 110_000);
        assert_eq!(deal.carrier_id, f.carrier.user_id);
        assert_eq!(
            f.state.orders.get(&f.order_id).unwrap().status,
            OrderStatus::InProgress
        );
    }

    #[tokio::test]
    async fn ratings_once_per_participant_after_delivery() {
        let f = fixture(Config::default());

        let early = rate(&f.state, f.client, f.deal_id, 5, None).await;
        assert!(matches!(early, Err(AppError::Conflict(_))));

        for next in [DealStatus::Accepted, DealStatus::InTransit, DealStatus::Delivered] {
            transition_deal(&f.state, f.carrier, f.deal_id, next).await.unwrap();
        }

        let rating = rate(&f.state, f.client, f.deal_id, 4, Some("on time".to_string()))
            .await
            .unwrap();
        assert_eq!(rating.ratee_id, f.carrier.user_id);

        let again = rate(&f.state, f.client, f.deal_id, 5, None).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let out_of_range = rate(&f.state, f.carrier, f.deal_id, 6, None).await;
        assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

        let summary = rating_summary(&f.state, f.carrier.user_id);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average, Some(4.0));
    }
}
