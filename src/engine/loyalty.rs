//! Points ledger.
//!
//! The balance change and the ledger append of one operation happen while the
//! account's map entry is held, so concurrent spends can never drive a balance
//! below zero and every balance change has a matching transaction row.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::identity::Identity;
use crate::models::loyalty::{
    LoyaltyAccount, LoyaltyTier, LoyaltyTransaction, Redemption, Reward, TransactionKind,
};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewReward {
    pub name: String,
    pub description: Option<String>,
    pub points_cost: u64,
}

pub fn account(state: &AppState, user_id: Uuid) -> LoyaltyAccount {
    state
        .loyalty_accounts
        .get(&user_id)
        .map(|entry| entry.value().clone())
        .unwrap_or_else(|| LoyaltyAccount::empty(user_id))
}

/// Ledger rows of a user, newest first.
pub fn history(state: &AppState, user_id: Uuid) -> Vec<LoyaltyTransaction> {
    let mut rows: Vec<LoyaltyTransaction> = state
        .loyalty_transactions
        .iter()
        .filter(|entry| entry.value().user_id == user_id)
        .map(|entry| entry.value().clone())
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

pub fn earn(
    state: &AppState,
    user_id: Uuid,
    amount: u64,
    reason: &str,
    reference_id: Option<Uuid>,
) -> Result<LoyaltyTransaction, AppError> {
    if amount == 0 {
        return Err(AppError::BadRequest("amount must be > 0".to_string()));
    }

    let mut account = state
        .loyalty_accounts
        .entry(user_id)
        .or_insert_with(|| LoyaltyAccount::empty(user_id));

    let balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| AppError::BadRequest("balance would overflow".to_string()))?;
    let lifetime_earned = account
        .lifetime_earned
        .checked_add(amount)
        .ok_or_else(|| AppError::BadRequest("lifetime total would overflow".to_string()))?;

    account.balance = balance;
    account.lifetime_earned = lifetime_earned;
    account.tier = LoyaltyTier::for_lifetime_earned(lifetime_earned);
    account.updated_at = Utc::now();

    let transaction = append(state, user_id, TransactionKind::Earn, amount, balance, reason, reference_id);
    drop(account);

    info!(%user_id, amount, balance, reason, "loyalty points earned");
    Ok(transaction)
}

pub fn spend(
    state: &AppState,
    user_id: Uuid,
    amount: u64,
    reason: &str,
    reference_id: Option<Uuid>,
) -> Result<LoyaltyTransaction, AppError> {
    if amount == 0 {
        return Err(AppError::BadRequest("amount must be > 0".to_string()));
    }

    let mut account = state
        .loyalty_accounts
        .get_mut(&user_id)
        .ok_or(AppError::InsufficientPoints {
            requested: amount,
            available: 0,
        })?;

    if amount > account.balance {
        return Err(AppError::InsufficientPoints {
            requested: amount,
            available: account.balance,
        });
    }

    let balance = account.balance - amount;
    account.balance = balance;
    account.lifetime_spent = account.lifetime_spent.saturating_add(amount);
    account.updated_at = Utc::now();

    let transaction = append(state, user_id, TransactionKind::Spend, amount, balance, reason, reference_id);
    drop(account);

    info!(%user_id, amount, balance, reason, "loyalty points spent");
    Ok(transaction)
}

fn append(
    state: &AppState,
    user_id: Uuid,
    kind: TransactionKind,
    amount: u64,
    balance_after: u64,
    reason: &str,
    reference_id: Option<Uuid>,
) -> LoyaltyTransaction {
    let transaction = LoyaltyTransaction {
        id: Uuid::new_v4(),
        user_id,
        kind,
        amount,
        balance_after,
        reason: reason.to_string(),
        reference_id,
        created_at: Utc::now(),
    };

    state
        .loyalty_transactions
        .insert(transaction.id, transaction.clone());
    state
        .metrics
        .loyalty_points_total
        .with_label_values(&[kind.as_label()])
        .inc_by(amount);

    transaction
}

pub fn create_reward(
    state: &AppState,
    identity: Identity,
    new: NewReward,
) -> Result<Reward, AppError> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden("only admins manage rewards".to_string()));
    }
    if new.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if new.points_cost == 0 {
        return Err(AppError::BadRequest("points_cost must be > 0".to_string()));
    }

    let reward = Reward {
        id: Uuid::new_v4(),
        name: new.name.trim().to_string(),
        description: new.description,
        points_cost: new.points_cost,
        active: true,
        created_at: Utc::now(),
    };
    state.rewards.insert(reward.id, reward.clone());
    Ok(reward)
}

/// Withdraws a reward from the catalogue. Past redemptions are kept.
pub fn deactivate_reward(
    state: &AppState,
    identity: Identity,
    reward_id: Uuid,
) -> Result<Reward, AppError> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden("only admins manage rewards".to_string()));
    }

    let mut reward = state
        .rewards
        .get_mut(&reward_id)
        .ok_or_else(|| AppError::NotFound(format!("reward {reward_id} not found")))?;
    reward.active = false;
    let updated = reward.clone();
    drop(reward);

    info!(%reward_id, admin_id = %identity.user_id, "reward withdrawn");
    Ok(updated)
}

/// Active rewards, cheapest first.
pub fn list_rewards(state: &AppState) -> Vec<Reward> {
    let mut rewards: Vec<Reward> = state
        .rewards
        .iter()
        .filter(|entry| entry.value().active)
        .map(|entry| entry.value().clone())
        .collect();
    rewards.sort_by(|a, b| a.points_cost.cmp(&b.points_cost));
    rewards
}

pub fn redeem_reward(
    state: &AppState,
    user_id: Uuid,
    reward_id: Uuid,
) -> Result<Redemption, AppError> {
    let reward = state
        .rewards
        .get(&reward_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("reward {reward_id} not found")))?;

    if !reward.active {
        return Err(AppError::Conflict(format!("reward {reward_id} is no longer offered")));
    }

    let transaction = spend(
        state,
        user_id,
        reward.points_cost,
        &format!("reward:{}", reward.name),
        Some(reward_id),
    )?;

    let redemption = Redemption {
        id: Uuid::new_v4(),
        user_id,
        reward_id,
        points_spent: reward.points_cost,
        transaction_id: transaction.id,
        created_at: transaction.created_at,
    };
    state.redemptions.insert(redemption.id, redemption.clone());
    info!(%user_id, %reward_id, points = reward.points_cost, "reward redeemed");

    Ok(redemption)
}
