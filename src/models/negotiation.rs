use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl NegotiationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NegotiationStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub response_id: Option<Uuid>,
    pub client_id: Uuid,
    pub carrier_id: Uuid,
    pub proposer_id: Uuid,
    pub price: u64,
    pub message: Option<String>,
    pub status: NegotiationStatus,
    /// Bumped on every write; readers drop updates older than what they hold.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Negotiation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.client_id || user_id == self.carrier_id
    }

    /// The party expected to answer this proposal.
    pub fn counterparty(&self) -> Uuid {
        if self.proposer_id == self.client_id {
            self.carrier_id
        } else {
            self.client_id
        }
    }
}
