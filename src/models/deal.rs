use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Pending,
    Accepted,
    InTransit,
    Delivered,
    Cancelled,
}

impl DealStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DealStatus::Delivered | DealStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: DealStatus) -> bool {
        use DealStatus::*;

        matches!(
            (self, next),
            (Pending, Accepted)
                | (Accepted, InTransit)
                | (InTransit, Delivered)
                | (Pending | Accepted | InTransit, Cancelled)
        )
    }

    /// A carrier may only report positions while the deal is live.
    pub fn is_trackable(self) -> bool {
        matches!(self, DealStatus::Accepted | DealStatus::InTransit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub order_id: Uuid,
    pub response_id: Uuid,
    pub client_id: Uuid,
    pub carrier_id: Uuid,
    pub agreed_price: u64,
    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.client_id || user_id == self.carrier_id
    }

    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if user_id == self.client_id {
            self.carrier_id
        } else {
            self.client_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DealStatus;

    #[test]
    fn delivery_path_is_linear() {
        assert!(DealStatus::Pending.can_transition_to(DealStatus::Accepted));
        assert!(DealStatus::Accepted.can_transition_to(DealStatus::InTransit));
        assert!(DealStatus::InTransit.can_transition_to(DealStatus::Delivered));
        assert!(!DealStatus::Pending.can_transition_to(DealStatus::Delivered));
        assert!(!DealStatus::Accepted.can_transition_to(DealStatus::Pending));
    }

    #[test]
    fn terminal_states_are_final() {
        for next in [
            DealStatus::Pending,
            DealStatus::Accepted,
            DealStatus::InTransit,
            DealStatus::Delivered,
            DealStatus::Cancelled,
        ] {
            assert!(!DealStatus::Delivered.can_transition_to(next));
            assert!(!DealStatus::Cancelled.can_transition_to(next));
        }
    }
}
