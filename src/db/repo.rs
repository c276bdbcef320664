//! Storage contracts.
//!
//! Every method is scoped by the owning `user_id` (or account id for
//! identity records). Operations that move Brain Bucks are single atomic
//! calls: the feature mutation, the ledger append and the cached balance
//! update either all commit or none do.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ledger::{LedgerEntry, LedgerPosting, NewLedgerEntry};
use crate::models::memory::{MemoryEntry, MemoryFilter, NewMemory};
use crate::models::preferences::{Preferences, PreferencesPatch};
use crate::models::reward::{NewReward, Reward};
use crate::models::task::{NewTask, Task, TaskFilter};
use crate::models::user::{Account, NewProfile, Profile, ProfilePatch, Provisioned, RefreshToken};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Returns `None` when the email is already registered.
    async fn create_account(&self, email: &str, password_hash: &str) -> AppResult<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> AppResult<Option<Account>>;

    async fn find_account(&self, account_id: Uuid) -> AppResult<Option<Account>>;

    async fn store_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        parent_token_id: Option<Uuid>,
    ) -> AppResult<Uuid>;

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshToken>>;

    async fn revoke_refresh_token(&self, token_id: Uuid) -> AppResult<()>;

    async fn revoke_all_refresh_tokens(&self, account_id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_profile_by_auth(&self, auth_id: Uuid) -> AppResult<Option<Profile>>;

    /// Creates the profile and its default preferences together. A second
    /// call for the same `auth_id` returns the existing row.
    async fn provision_profile(&self, auth_id: Uuid, new: NewProfile) -> AppResult<Provisioned>;

    async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> AppResult<Profile>;

    async fn find_preferences(&self, user_id: Uuid) -> AppResult<Option<Preferences>>;

    async fn update_preferences(
        &self,
        user_id: Uuid,
        patch: PreferencesPatch,
    ) -> AppResult<Preferences>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Appends `entry` and moves the cached balance by its amount, serialized
    /// per user. A debit that would overdraw fails with `InsufficientFunds`
    /// and writes nothing.
    async fn post_entry(&self, entry: NewLedgerEntry) -> AppResult<LedgerPosting>;

    async fn cached_balance(&self, user_id: Uuid) -> AppResult<i64>;

    /// `(sum of amounts, row count)` replayed from the ledger.
    async fn ledger_totals(&self, user_id: Uuid) -> AppResult<(i64, i64)>;

    async fn list_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LedgerEntry>>;
}

/// Outcome of completing a task. `posting` is `None` if the task had
/// already been completed.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task: Task,
    pub posting: Option<LedgerPosting>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> AppResult<Vec<Task>>;

    async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<Task>;

    async fn create_task(&self, user_id: Uuid, new: NewTask) -> AppResult<Task>;

    /// Marks the task completed, credits `award` and records activity on `today`.
    async fn complete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        award: i64,
        today: NaiveDate,
    ) -> AppResult<TaskCompletion>;
}

#[derive(Debug, Clone)]
pub struct MemoryLogged {
    pub memory: MemoryEntry,
    pub posting: LedgerPosting,
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn list_memories(&self, user_id: Uuid, filter: MemoryFilter) -> AppResult<Vec<MemoryEntry>>;

    /// Inserts the entry, credits `award` and records activity on `today`.
    async fn log_memory(
        &self,
        user_id: Uuid,
        new: NewMemory,
        award: i64,
        today: NaiveDate,
    ) -> AppResult<MemoryLogged>;
}

#[derive(Debug, Clone)]
pub struct RewardRedemption {
    pub reward: Reward,
    pub posting: LedgerPosting,
}

#[async_trait]
pub trait RewardRepository: Send + Sync {
    /// Active rewards, cheapest first.
    async fn list_rewards(&self, user_id: Uuid) -> AppResult<Vec<Reward>>;

    async fn create_reward(&self, user_id: Uuid, new: NewReward) -> AppResult<Reward>;

    /// Debits the reward's cost and marks it redeemed.
    async fn redeem_reward(&self, user_id: Uuid, reward_id: Uuid) -> AppResult<RewardRedemption>;
}

#[async_trait]
pub trait Store:
    AccountRepository
    + ProfileRepository
    + LedgerRepository
    + TaskRepository
    + MemoryRepository
    + RewardRepository
    + Send
    + Sync
{
    /// Liveness check used by `/readyz`.
    async fn ping(&self) -> AppResult<()>;
}
