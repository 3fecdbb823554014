use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::change::{Change, ChangeEvent};
use crate::models::identity::Identity;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeedFilter {
    pub order_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
}

impl FeedFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        let by_order = self
            .order_id
            .is_none_or(|id| event.change.order_id() == Some(id));
        let by_deal = self
            .deal_id
            .is_none_or(|id| event.change.deal_id() == Some(id));
        by_order && by_deal
    }
}

/// Orders are public. Every other row only reaches the parties it concerns.
fn visible_to(state: &AppState, identity: Identity, event: &ChangeEvent) -> bool {
    if identity.is_admin() {
        return true;
    }

    let user_id = identity.user_id;
    match &event.change {
        Change::Order(_) => true,
        Change::Negotiation(negotiation) => negotiation.is_participant(user_id),
        Change::Deal(deal) => deal.is_participant(user_id),
        Change::Bid(bid) => {
            bid.carrier_id == user_id
                || state
                    .orders
                    .get(&bid.order_id)
                    .is_some_and(|order| order.client_id == user_id)
        }
        Change::Location(ping) => {
            ping.carrier_id == user_id
                || state
                    .deals
                    .get(&ping.deal_id)
                    .is_some_and(|deal| deal.client_id == user_id)
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    identity: Identity,
    Query(filter): Query<FeedFilter>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, filter))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: Identity,
    filter: FeedFilter,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.change_tx.subscribe());

    info!(user_id = %identity.user_id, ?filter, "change feed subscriber connected");

    let feed_state = state.clone();
    let send_task = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "change feed subscriber lagged; events skipped");
                    continue;
                }
            };

            if !filter.matches(&event) || !visible_to(&feed_state, identity, &event) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize change event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(user_id = %identity.user_id, "change feed subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{visible_to, FeedFilter};
    use crate::config::Config;
    use crate::models::bid::Bid;
    use crate::models::change::{Change, ChangeEvent, ChangeKind};
    use crate::models::identity::{Identity, Role};
    use crate::models::negotiation::{Negotiation, NegotiationStatus};
    use crate::models::order::{Order, OrderStatus};
    use crate::models::tracking::{GeoPoint, LocationPing, PingSource};
    use crate::state::AppState;

    fn event(change: Change) -> ChangeEvent {
        ChangeEvent {
            seq: 7,
            kind: ChangeKind::Insert,
            change,
            emitted_at: Utc::now(),
        }
    }

    fn ping_event(deal_id: Uuid) -> ChangeEvent {
        event(Change::Location(LocationPing {
            id: Uuid::new_v4(),
            deal_id,
            carrier_id: Uuid::new_v4(),
            point: GeoPoint { lat: 41.3, lng: 69.2 },
            speed_kmh: None,
            heading: None,
            source: PingSource::Device,
            recorded_at: Utc::now(),
        }))
    }

    #[test]
    fn filter_by_deal() {
        let deal_id = Uuid::new_v4();
        let filter = FeedFilter {
            order_id: None,
            deal_id: Some(deal_id),
        };

        assert!(filter.matches(&ping_event(deal_id)));
        assert!(!filter.matches(&ping_event(Uuid::new_v4())));
        assert!(FeedFilter::default().matches(&ping_event(deal_id)));
    }

    #[test]
    fn order_filter_excludes_pings() {
        let filter = FeedFilter {
            order_id: Some(Uuid::new_v4()),
            deal_id: None,
        };
        assert!(!filter.matches(&ping_event(Uuid::new_v4())));
    }

    #[test]
    fn negotiation_rows_stay_inside_their_thread() {
        let (state, _rx) = AppState::new(Config::default());
        let client = Identity::new(Uuid::new_v4(), Role::Client);
        let carrier = Identity::new(Uuid::new_v4(), Role::Carrier);
        let rival = Identity::new(Uuid::new_v4(), Role::Carrier);
        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        let now = Utc::now();

        let thread = event(Change::Negotiation(Negotiation {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            response_id: None,
            client_id: client.user_id,
            carrier_id: carrier.user_id,
            proposer_id: carrier.user_id,
            price: 120_000,
            message: None,
            status: NegotiationStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        }));

        assert!(visible_to(&state, client, &thread));
        assert!(visible_to(&state, carrier, &thread));
        assert!(visible_to(&state, admin, &thread));
        assert!(!visible_to(&state, rival, &thread));
    }

    #[test]
    fn bids_reach_only_their_carrier_and_the_order_client() {
        let (state, _rx) = AppState::new(Config::default());
        let client = Identity::new(Uuid::new_v4(), Role::Client);
        let carrier = Identity::new(Uuid::new_v4(), Role::Carrier);
        let rival = Identity::new(Uuid::new_v4(), Role::Carrier);
        let now = Utc::now();

        let order = Order {
            id: Uuid::new_v4(),
            client_id: client.user_id,
            cargo_description: "steel coils".to_string(),
            pickup_address: "Navoi".to_string(),
            delivery_address: "Bukhara".to_string(),
            weight_kg: None,
            desired_price: 90_000,
            status: OrderStatus::Open,
            created_at: now,
            updated_at: now,
        };
        let order_id = order.id;
        state.orders.insert(order_id, order);

        let bid = event(Change::Bid(Bid {
            id: Uuid::new_v4(),
            order_id,
            carrier_id: carrier.user_id,
            price: 150_000,
            delivery_days: 2,
            comment: None,
            created_at: now,
            updated_at: now,
        }));

        assert!(visible_to(&state, carrier, &bid));
        assert!(visible_to(&state, client, &bid));
        assert!(!visible_to(&state, rival, &bid));
    }
}
