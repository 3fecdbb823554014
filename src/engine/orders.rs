use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::feed::publish;
use crate::engine::tracking::stop_tracking;
use crate::error::AppError;
use crate::models::bid::Bid;
use crate::models::change::{Change, ChangeKind};
use crate::models::deal::DealStatus;
use crate::models::identity::{Identity, Role};
use crate::models::kyc::KycStatus;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub cargo_description: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub weight_kg: Option<f64>,
    pub desired_price: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBid {
    pub price: u64,
    pub delivery_days: u32,
    pub comment: Option<String>,
}

pub fn create_order(state: &AppState, identity: Identity, new: NewOrder) -> Result<Order, AppError> {
    identity.require_role(Role::Client)?;

    for (field, value) in [
        ("cargo_description", &new.cargo_description),
        ("pickup_address", &new.pickup_address),
        ("delivery_address", &new.delivery_address),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} cannot be empty")));
        }
    }

    if new.desired_price == 0 {
        return Err(AppError::BadRequest("desired_price must be > 0".to_string()));
    }

    if let Some(weight) = new.weight_kg {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(AppError::BadRequest("weight_kg must be > 0".to_string()));
        }
    }

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        client_id: identity.user_id,
        cargo_description: new.cargo_description.trim().to_string(),
        pickup_address: new.pickup_address.trim().to_string(),
        delivery_address: new.delivery_address.trim().to_string(),
        weight_kg: new.weight_kg,
        desired_price: new.desired_price,
        status: OrderStatus::Open,
        created_at: now,
        updated_at: now,
    };

    state.orders.insert(order.id, order.clone());
    publish(state, ChangeKind::Insert, Change::Order(order.clone()));
    info!(order_id = %order.id, client_id = %order.client_id, "order created");

    Ok(order)
}

/// Orders newest first, optionally filtered by status.
pub fn list_orders(state: &AppState, status: Option<OrderStatus>) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| status.is_none_or(|wanted| entry.value().status == wanted))
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

pub fn get_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

/// Cancels the order and every live deal attached to it.
pub async fn cancel_order(
    state: &AppState,
    identity: Identity,
    order_id: Uuid,
) -> Result<Order, AppError> {
    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let mut order = get_order(state, order_id)?;
    if !identity.is_admin() && identity.user_id != order.client_id {
        return Err(AppError::Forbidden(
            "only the order's client can cancel it".to_string(),
        ));
    }
    if order.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "order {order_id} is already {:?}",
            order.status
        )));
    }

    let now = Utc::now();
    let live_deals: Vec<Uuid> = state
        .deals
        .iter()
        .filter(|entry| entry.value().order_id == order_id && !entry.value().status.is_terminal())
        .map(|entry| entry.value().id)
        .collect();

    for deal_id in live_deals {
        let updated = state.deals.get_mut(&deal_id).map(|mut deal| {
            deal.status = DealStatus::Cancelled;
            deal.updated_at = now;
            deal.clone()
        });
        if let Some(deal) = updated {
            stop_tracking(state, deal.id);
            publish(state, ChangeKind::Update, Change::Deal(deal));
        }
    }

    order.status = OrderStatus::Cancelled;
    order.updated_at = now;
    state.orders.insert(order.id, order.clone());
    publish(state, ChangeKind::Update, Change::Order(order.clone()));
    info!(%order_id, "order cancelled");

    Ok(order)
}

pub async fn submit_bid(
    state: &AppState,
    identity: Identity,
    order_id: Uuid,
    new: NewBid,
) -> Result<Bid, AppError> {
    if identity.role != Role::Carrier {
        return Err(AppError::Forbidden("only carriers can respond to orders".to_string()));
    }
    if new.price == 0 {
        return Err(AppError::BadRequest("price must be > 0".to_string()));
    }
    if new.delivery_days == 0 {
        return Err(AppError::BadRequest("delivery_days must be > 0".to_string()));
    }

    if state.config.require_carrier_kyc {
        let verified = state
            .kyc_records
            .get(&identity.user_id)
            .is_some_and(|record| record.status == KycStatus::Verified);
        if !verified {
            return Err(AppError::Forbidden(
                "carrier identity verification is required before bidding".to_string(),
            ));
        }
    }

    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let order = get_order(state, order_id)?;
    if order.status != OrderStatus::Open {
        return Err(AppError::Conflict(format!(
            "order {order_id} is not open for responses"
        )));
    }

    let duplicate = state.bids.iter().any(|entry| {
        entry.value().order_id == order_id && entry.value().carrier_id == identity.user_id
    });
    if duplicate {
        return Err(AppError::Conflict(
            "carrier already responded to this order".to_string(),
        ));
    }

    let now = Utc::now();
    let bid = Bid {
        id: Uuid::new_v4(),
        order_id,
        carrier_id: identity.user_id,
        price: new.price,
        delivery_days: new.delivery_days,
        comment: new.comment.filter(|c| !c.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };

    state.bids.insert(bid.id, bid.clone());
    publish(state, ChangeKind::Insert, Change::Bid(bid.clone()));
    info!(bid_id = %bid.id, %order_id, carrier_id = %bid.carrier_id, price = bid.price, "response submitted");

    Ok(bid)
}

/// Bids of an order, cheapest first.
pub fn list_bids(state: &AppState, order_id: Uuid) -> Result<Vec<Bid>, AppError> {
    get_order(state, order_id)?;

    let mut bids: Vec<Bid> = state
        .bids
        .iter()
        .filter(|entry| entry.value().order_id == order_id)
        .map(|entry| entry.value().clone())
        .collect();
    bids.sort_by(|a, b| a.price.cmp(&b.price).then(a.created_at.cmp(&b.created_at)));
    Ok(bids)
}
