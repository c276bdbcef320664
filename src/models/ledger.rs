use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::reward::Reward;
use crate::error::{AppError, AppResult};

pub const ACTION_TASK_COMPLETED: &str = "task_completed";
pub const ACTION_MEMORY_ADDED: &str = "memory_added";
pub const ACTION_REWARD_REDEEMED: &str = "reward_redeemed";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action_type: String,
    pub amount: i64,
    pub description: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A ledger row waiting to be posted. `amount` is signed: positive credits,
/// negative debits.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub action_type: String,
    pub amount: i64,
    pub description: Option<String>,
    pub reference_id: Option<Uuid>,
}

impl NewLedgerEntry {
    pub fn credit(user_id: Uuid, amount: i64, action_type: &str, description: Option<&str>) -> Self {
        Self {
            user_id,
            action_type: action_type.to_string(),
            amount,
            description: description.map(str::to_string),
            reference_id: None,
        }
    }

    pub fn debit(user_id: Uuid, amount: i64, action_type: &str, description: Option<&str>) -> Self {
        Self {
            amount: -amount,
            ..Self::credit(user_id, amount, action_type, description)
        }
    }

    pub fn task_completed(user_id: Uuid, task_id: Uuid, award: i64) -> Self {
        Self {
            reference_id: Some(task_id),
            ..Self::credit(user_id, award, ACTION_TASK_COMPLETED, Some("Task completed"))
        }
    }

    pub fn memory_added(user_id: Uuid, memory_id: Uuid, award: i64) -> Self {
        Self {
            reference_id: Some(memory_id),
            ..Self::credit(user_id, award, ACTION_MEMORY_ADDED, Some("Memory added to your map"))
        }
    }

    pub fn reward_redeemed(reward: &Reward) -> Self {
        let description = format!("Redeemed: {}", reward.title);
        Self {
            reference_id: Some(reward.id),
            ..Self::debit(reward.user_id, reward.cost, ACTION_REWARD_REDEEMED, Some(&description))
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }

    /// Balance after applying this entry. A debit that would overdraw fails
    /// with `InsufficientFunds`; a credit past `i64::MAX` is a validation error.
    pub fn apply_to(&self, balance: i64) -> AppResult<i64> {
        if self.is_debit() {
            let required = -self.amount;
            return match balance.checked_add(self.amount) {
                Some(next) if next >= 0 => Ok(next),
                _ => Err(AppError::InsufficientFunds { balance, required }),
            };
        }
        balance
            .checked_add(self.amount)
            .ok_or_else(|| AppError::Validation("Brain Bucks balance limit exceeded".into()))
    }

    pub fn into_entry(self, id: Uuid, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id: self.user_id,
            action_type: self.action_type,
            amount: self.amount,
            description: self.description,
            reference_id: self.reference_id,
            created_at,
        }
    }
}

/// One committed posting: the appended row and the balance it produced.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerPosting {
    pub entry: LedgerEntry,
    pub balance: i64,
}

/// Cached balance checked against a full replay of the ledger.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BalanceAudit {
    pub user_id: Uuid,
    pub cached_balance: i64,
    pub ledger_sum: i64,
    pub entry_count: i64,
    pub consistent: bool,
}

impl BalanceAudit {
    pub fn new(user_id: Uuid, cached_balance: i64, ledger_sum: i64, entry_count: i64) -> Self {
        Self {
            user_id,
            cached_balance,
            ledger_sum,
            entry_count,
            consistent: cached_balance == ledger_sum,
        }
    }
}
