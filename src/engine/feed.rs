//! Change feed publishing and the negotiation board reducer.
//!
//! Direct fetches and live change events go through the same [`NegotiationBoard::apply`]
//! path, so a board built from a snapshot and a board kept up to date from the
//! feed converge on the same rows.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::models::change::{Change, ChangeEvent, ChangeKind};
use crate::models::negotiation::{Negotiation, NegotiationStatus};
use crate::state::AppState;

pub fn publish(state: &AppState, kind: ChangeKind, change: Change) {
    state
        .metrics
        .change_events_total
        .with_label_values(&[change.table()])
        .inc();

    let event = ChangeEvent {
        seq: state.next_change_seq(),
        kind,
        change,
        emitted_at: Utc::now(),
    };

    // No subscribers is not an error; late joiners fetch the current state.
    let _ = state.change_tx.send(event);
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationBoard {
    order_id: Uuid,
    negotiations: Vec<Negotiation>,
}

impl NegotiationBoard {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            negotiations: Vec::new(),
        }
    }

    pub fn load(state: &AppState, order_id: Uuid) -> Self {
        let rows: Vec<Negotiation> = state
            .negotiations
            .iter()
            .filter(|entry| entry.value().order_id == order_id)
            .map(|entry| entry.value().clone())
            .collect();

        let mut board = Self::new(order_id);
        for row in rows {
            board.upsert(row);
        }
        board
    }

    /// Folds one feed event into the board. Returns whether anything changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match &event.change {
            Change::Negotiation(negotiation) if negotiation.order_id == self.order_id => {
                self.upsert(negotiation.clone())
            }
            _ => false,
        }
    }

    fn upsert(&mut self, incoming: Negotiation) -> bool {
        if let Some(idx) = self.negotiations.iter().position(|n| n.id == incoming.id) {
            if self.negotiations[idx].version >= incoming.version {
                return false;
            }
            self.negotiations[idx] = incoming;
            return true;
        }

        let key = (incoming.created_at, incoming.id);
        let pos = self
            .negotiations
            .partition_point(|n| (n.created_at, n.id) <= key);
        self.negotiations.insert(pos, incoming);
        true
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    /// All negotiations of the order in creation order.
    pub fn negotiations(&self) -> &[Negotiation] {
        &self.negotiations
    }

    pub fn thread(&self, carrier_id: Uuid) -> impl Iterator<Item = &Negotiation> {
        self.negotiations
            .iter()
            .filter(move |n| n.carrier_id == carrier_id)
    }

    /// Most recent negotiation between the order's client and `carrier_id`.
    pub fn active(&self, carrier_id: Uuid) -> Option<&Negotiation> {
        self.thread(carrier_id).last()
    }

    pub fn accepted(&self) -> impl Iterator<Item = &Negotiation> {
        self.negotiations
            .iter()
            .filter(|n| n.status == NegotiationStatus::Accepted)
    }

    /// A party may not stack a second proposal on its own pending one.
    pub fn can_propose(&self, user_id: Uuid, carrier_id: Uuid) -> bool {
        !matches!(
            self.active(carrier_id),
            Some(n) if n.status == NegotiationStatus::Pending && n.proposer_id == user_id
        )
    }
}
