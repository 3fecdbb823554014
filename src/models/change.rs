use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::bid::Bid;
use crate::models::deal::Deal;
use crate::models::negotiation::Negotiation;
use crate::models::order::Order;
use crate::models::tracking::LocationPing;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// Row carried by a change event, tagged with the table it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "table", content = "record")]
pub enum Change {
    #[serde(rename = "orders")]
    Order(Order),
    #[serde(rename = "responses")]
    Bid(Bid),
    #[serde(rename = "price_negotiations")]
    Negotiation(Negotiation),
    #[serde(rename = "deals")]
    Deal(Deal),
    #[serde(rename = "gps_locations")]
    Location(LocationPing),
}

impl Change {
    pub fn table(&self) -> &'static str {
        match self {
            Change::Order(_) => "orders",
            Change::Bid(_) => "responses",
            Change::Negotiation(_) => "price_negotiations",
            Change::Deal(_) => "deals",
            Change::Location(_) => "gps_locations",
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Change::Order(order) => Some(order.id),
            Change::Bid(bid) => Some(bid.order_id),
            Change::Negotiation(negotiation) => Some(negotiation.order_id),
            Change::Deal(deal) => Some(deal.order_id),
            Change::Location(_) => None,
        }
    }

    pub fn deal_id(&self) -> Option<Uuid> {
        match self {
            Change::Deal(deal) => Some(deal.id),
            Change::Location(ping) => Some(ping.deal_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub seq: u64,
    pub kind: ChangeKind,
    pub change: Change,
    pub emitted_at: DateTime<Utc>,
}
