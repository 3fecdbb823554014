use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyTier {
    pub fn for_lifetime_earned(points: u64) -> Self {
        match points {
            0..1_000 => LoyaltyTier::Bronze,
            1_000..5_000 => LoyaltyTier::Silver,
            5_000..15_000 => LoyaltyTier::Gold,
            _ => LoyaltyTier::Platinum,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    pub user_id: Uuid,
    pub balance: u64,
    pub lifetime_earned: u64,
    pub lifetime_spent: u64,
    pub tier: LoyaltyTier,
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            balance: 0,
            lifetime_earned: 0,
            lifetime_spent: 0,
            tier: LoyaltyTier::Bronze,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earn,
    Spend,
}

impl TransactionKind {
    pub fn as_label(self) -> &'static str {
        match self {
            TransactionKind::Earn => "earn",
            TransactionKind::Spend => "spend",
        }
    }
}

/// Append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: u64,
    pub balance_after: u64,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub points_cost: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_id: Uuid,
    pub points_spent: u64,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::LoyaltyTier;

    #[test]
    fn tier_thresholds() {
        assert_eq!(LoyaltyTier::for_lifetime_earned(0), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_lifetime_earned(999), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_lifetime_earned(1_000), LoyaltyTier::Silver);
        assert_eq!(LoyaltyTier::for_lifetime_earned(5_000), LoyaltyTier::Gold);
        assert_eq!(LoyaltyTier::for_lifetime_earned(15_000), LoyaltyTier::Platinum);
        assert_eq!(LoyaltyTier::for_lifetime_earned(u64::MAX), LoyaltyTier::Platinum);
    }
}
