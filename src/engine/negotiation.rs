use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::feed::{publish, NegotiationBoard};
use crate::error::AppError;
use crate::models::bid::Bid;
use crate::models::change::{Change, ChangeKind};
use crate::models::deal::{Deal, DealStatus};
use crate::models::identity::{Identity, Role};
use crate::models::negotiation::{Negotiation, NegotiationStatus};
use crate::models::order::Order;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct Proposal {
    pub response_id: Option<Uuid>,
    pub price: u64,
    pub message: Option<String>,
}

/// Every row written by a successful accept.
#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub negotiation: Negotiation,
    pub bid: Option<Bid>,
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub order_id: Uuid,
    pub negotiations: Vec<Negotiation>,
    pub active: Option<Negotiation>,
    pub can_propose: bool,
}

fn record_outcome(state: &AppState, outcome: &str) {
    state
        .metrics
        .negotiations_total
        .with_label_values(&[outcome])
        .inc();
}

fn load_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

fn load_negotiation(state: &AppState, id: Uuid) -> Result<Negotiation, AppError> {
    state
        .negotiations
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("negotiation {id} not found")))
}

fn ensure_pending(negotiation: &Negotiation) -> Result<(), AppError> {
    if negotiation.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "negotiation {} is already {:?}",
            negotiation.id, negotiation.status
        )));
    }
    Ok(())
}

pub async fn propose(
    state: &AppState,
    identity: Identity,
    order_id: Uuid,
    proposal: Proposal,
) -> Result<Negotiation, AppError> {
    if proposal.price == 0 {
        return Err(AppError::BadRequest("price must be > 0".to_string()));
    }

    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let order = load_order(state, order_id)?;
    if order.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {:?}",
            order.status
        )));
    }

    let bid = match proposal.response_id {
        Some(response_id) => {
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
            Some(bid)
        }
        None => None,
    };

    let carrier_id = match &bid {
        Some(bid) => bid.carrier_id,
        None if identity.user_id == order.client_id => {
            return Err(AppError::BadRequest(
                "client proposals must reference a response".to_string(),
            ));
        }
        None if identity.role == Role::Carrier => identity.user_id,
        None => {
            return Err(AppError::Forbidden(
                "only the order's client or a carrier can propose".to_string(),
            ));
        }
    };

    if identity.user_id != order.client_id && identity.user_id != carrier_id {
        return Err(AppError::Forbidden(
            "proposer is not a party to this negotiation".to_string(),
        ));
    }

    let contracted_carrier = state
        .deals
        .iter()
        .find(|entry| {
            entry.value().order_id == order_id && entry.value().status != DealStatus::Cancelled
        })
        .map(|entry| entry.value().carrier_id);
    if contracted_carrier.is_some_and(|contracted| contracted != carrier_id) {
        record_outcome(state, "conflict");
        return Err(AppError::Conflict(format!(
            "order {order_id} is contracted to another carrier"
        )));
    }

    let board = NegotiationBoard::load(state, order_id);

    if state.config.exclusive_acceptance && board.accepted().next().is_some() {
        record_outcome(state, "conflict");
        return Err(AppError::Conflict(format!(
            "order {order_id} already has an accepted price"
        )));
    }

    if !board.can_propose(identity.user_id, carrier_id) {
        if state.config.alternate_turns {
            record_outcome(state, "conflict");
            return Err(AppError::Conflict(
                "previous proposal is still waiting for an answer".to_string(),
            ));
        }
        warn!(%order_id, proposer_id = %identity.user_id, "consecutive proposal from the same party");
    }

    let now = Utc::now();
    let negotiation = Negotiation {
        id: Uuid::new_v4(),
        order_id,
        response_id: proposal.response_id,
        client_id: order.client_id,
        carrier_id,
        proposer_id: identity.user_id,
        price: proposal.price,
        message: proposal.message.filter(|m| !m.trim().is_empty()),
        status: NegotiationStatus::Pending,
        version: 1,
        created_at: now,
        updated_at: now,
    };

    state.negotiations.insert(negotiation.id, negotiation.clone());
    record_outcome(state, "proposed");
    publish(state, ChangeKind::Insert, Change::Negotiation(negotiation.clone()));

    info!(
        negotiation_id = %negotiation.id,
        %order_id,
        proposer_id = %identity.user_id,
        price = negotiation.price,
        "price proposed"
    );

    Ok(negotiation)
}

/// Accepts a pending proposal. All preconditions are checked under the order
/// lock before the first write, so the negotiation, the linked bid and the
/// order's deals are updated together or not at all.
pub async fn accept(
    state: &AppState,
    identity: Identity,
    negotiation_id: Uuid,
) -> Result<Acceptance, AppError> {
    let order_id = load_negotiation(state, negotiation_id)?.order_id;

    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let mut negotiation = load_negotiation(state, negotiation_id)?;
    if let Err(err) = ensure_pending(&negotiation) {
        record_outcome(state, "conflict");
        return Err(err);
    }

    if !identity.is_admin() && identity.user_id != negotiation.counterparty() {
        return Err(AppError::Forbidden(
            "only the other party can accept this proposal".to_string(),
        ));
    }

    let order = load_order(state, order_id)?;
    if order.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {:?}",
            order.status
        )));
    }

    if state.config.exclusive_acceptance {
        let already_accepted = state.negotiations.iter().any(|entry| {
            let other = entry.value();
            other.order_id == order_id
                && other.id != negotiation_id
                && other.status == NegotiationStatus::Accepted
        });
        if already_accepted {
            record_outcome(state, "conflict");
            return Err(AppError::Conflict(format!(
                "order {order_id} already has an accepted price"
            )));
        }
    }

    let mut bid = match negotiation.response_id {
        Some(response_id) => Some(
            state
                .bids
                .get(&response_id)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| {
                    AppError::Conflict(format!("linked response {response_id} no longer exists"))
                })?,
        ),
        None => None,
    };

    let mut deals: Vec<Deal> = state
        .deals
        .iter()
        .filter(|entry| entry.value().order_id == order_id)
        .map(|entry| entry.value().clone())
        .collect();

    let now = Utc::now();
    let price = negotiation.price;

    negotiation.status = NegotiationStatus::Accepted;
    negotiation.version += 1;
    negotiation.updated_at = now;
    state.negotiations.insert(negotiation.id, negotiation.clone());

    if let Some(bid) = bid.as_mut() {
        bid.price = price;
        bid.updated_at = now;
        state.bids.insert(bid.id, bid.clone());
    }

    for deal in &mut deals {
        deal.agreed_price = price;
        deal.updated_at = now;
        state.deals.insert(deal.id, deal.clone());
    }

    publish(state, ChangeKind::Update, Change::Negotiation(negotiation.clone()));
    if let Some(bid) = &bid {
        publish(state, ChangeKind::Update, Change::Bid(bid.clone()));
    }
    for deal in &deals {
        publish(state, ChangeKind::Update, Change::Deal(deal.clone()));
    }

    record_outcome(state, "accepted");
    info!(
        %negotiation_id,
        %order_id,
        price,
        deals = deals.len(),
        "price accepted"
    );

    Ok(Acceptance {
        negotiation,
        bid,
        deals,
    })
}

pub async fn reject(
    state: &AppState,
    identity: Identity,
    negotiation_id: Uuid,
) -> Result<Negotiation, AppError> {
    let order_id = load_negotiation(state, negotiation_id)?.order_id;

    let lock = state.order_lock(order_id);
    let _guard = lock.lock().await;

    let mut negotiation = load_negotiation(state, negotiation_id)?;
    if let Err(err) = ensure_pending(&negotiation) {
        record_outcome(state, "conflict");
        return Err(err);
    }

    if !identity.is_admin() && !negotiation.is_participant(identity.user_id) {
        return Err(AppError::Forbidden(
            "caller is not a party to this negotiation".to_string(),
        ));
    }

    negotiation.status = NegotiationStatus::Rejected;
    negotiation.version += 1;
    negotiation.updated_at = Utc::now();
    state.negotiations.insert(negotiation.id, negotiation.clone());

    publish(state, ChangeKind::Update, Change::Negotiation(negotiation.clone()));
    record_outcome(state, "rejected");
    info!(%negotiation_id, %order_id, "price rejected");

    Ok(negotiation)
}

/// Negotiations visible to the caller. Carriers only see their own thread.
pub fn board_view(
    state: &AppState,
    identity: Identity,
    order_id: Uuid,
    carrier_id: Option<Uuid>,
) -> Result<BoardView, AppError> {
    let order = load_order(state, order_id)?;
    let board = NegotiationBoard::load(state, order_id);

    let thread_carrier = if identity.is_admin() || identity.user_id == order.client_id {
        carrier_id
    } else if identity.role == Role::Carrier {
        Some(identity.user_id)
    } else {
        return Err(AppError::Forbidden(
            "caller cannot view this order's negotiations".to_string(),
        ));
    };

    let negotiations: Vec<Negotiation> = match thread_carrier {
        Some(carrier) => board.thread(carrier).cloned().collect(),
        None => board.negotiations().to_vec(),
    };

    let active = thread_carrier.and_then(|carrier| board.active(carrier).cloned());

    let blocked = order.status.is_terminal()
        || (state.config.exclusive_acceptance && board.accepted().next().is_some());
    let can_propose = !blocked
        && thread_carrier
            .map(|carrier| board.can_propose(identity.user_id, carrier))
            .unwrap_or(false);

    Ok(BoardView {
        order_id,
        negotiations,
        active,
        can_propose,
    })
}
