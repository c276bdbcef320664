//! Brain Bucks ledger.
//!
//! The cached balance on `users` is a materialized view of the append-only
//! `brain_bucks_ledger`. Every movement goes through [`LedgerRepository::post_entry`]
//! or one of the feature-coupled store operations, all of which append the
//! row and update the cache as one serialized step per user.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repo::{MemoryLogged, RewardRedemption, Store, TaskCompletion};
use crate::error::{AppError, AppResult};
use crate::models::ledger::{BalanceAudit, LedgerEntry, LedgerPosting, NewLedgerEntry};
use crate::models::memory::NewMemory;
use crate::services::events::{EventBus, ServerEvent};

pub const MAX_HISTORY: i64 = 200;

/// Points credited for earning actions.
#[derive(Debug, Clone, Copy)]
pub struct AwardSchedule {
    pub task_completion: i64,
    pub memory_logged: i64,
}

impl Default for AwardSchedule {
    fn default() -> Self {
        Self {
            task_completion: 5,
            memory_logged: 5,
        }
    }
}

#[derive(Clone)]
pub struct PointsLedger {
    store: Arc<dyn Store>,
    events: EventBus,
    awards: AwardSchedule,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn Store>, events: EventBus, awards: AwardSchedule) -> Self {
        Self {
            store,
            events,
            awards,
        }
    }

    /// Adds `amount` points. Non-positive amounts are rejected with a
    /// validation error and nothing is written.
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: i64,
        action_type: &str,
        description: Option<&str>,
    ) -> AppResult<i64> {
        check_movement(amount, action_type)?;
        let posting = self
            .store
            .post_entry(NewLedgerEntry::credit(user_id, amount, action_type, description))
            .await?;
        self.announce(&posting);
        Ok(posting.balance)
    }

    /// Removes `amount` points, or fails with `InsufficientFunds` leaving the
    /// balance and ledger untouched.
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: i64,
        action_type: &str,
        description: Option<&str>,
    ) -> AppResult<i64> {
        check_movement(amount, action_type)?;
        let result = self
            .store
            .post_entry(NewLedgerEntry::debit(user_id, amount, action_type, description))
            .await;
        let posting = self.settle(user_id, result)?;
        Ok(posting.balance)
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<i64> {
        self.store.cached_balance(user_id).await
    }

    /// Replays the ledger and compares it with the cached balance.
    pub async fn audit(&self, user_id: Uuid) -> AppResult<BalanceAudit> {
        let cached = self.store.cached_balance(user_id).await?;
        let (sum, count) = self.store.ledger_totals(user_id).await?;
        let audit = BalanceAudit::new(user_id, cached, sum, count);
        if !audit.consistent {
            tracing::error!(
                user_id = %user_id,
                cached_balance = cached,
                ledger_sum = sum,
                "Brain Bucks balance drifted from ledger"
            );
        }
        Ok(audit)
    }

    pub async fn history(&self, user_id: Uuid, limit: Option<i64>) -> AppResult<Vec<LedgerEntry>> {
        let limit = limit.unwrap_or(50).clamp(1, MAX_HISTORY);
        self.store.list_entries(user_id, limit).await
    }

    pub async fn complete_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<TaskCompletion> {
        let today = Utc::now().date_naive();
        let completion = self
            .store
            .complete_task(user_id, task_id, self.awards.task_completion, today)
            .await?;
        match &completion.posting {
            Some(posting) => self.announce(posting),
            None => tracing::debug!(user_id = %user_id, task_id = %task_id, "Task already completed, no award"),
        }
        Ok(completion)
    }

    pub async fn log_memory(&self, user_id: Uuid, new: NewMemory) -> AppResult<MemoryLogged> {
        let today = Utc::now().date_naive();
        let logged = self
            .store
            .log_memory(user_id, new, self.awards.memory_logged, today)
            .await?;
        self.announce(&logged.posting);
        Ok(logged)
    }

    pub async fn redeem_reward(&self, user_id: Uuid, reward_id: Uuid) -> AppResult<RewardRedemption> {
        let result = self.store.redeem_reward(user_id, reward_id).await;
        if let Err(AppError::InsufficientFunds { balance, required }) = &result {
            tracing::debug!(
                user_id = %user_id,
                reward_id = %reward_id,
                balance = balance,
                required = required,
                "Reward redemption declined"
            );
        }
        let redemption = result?;
        self.announce(&redemption.posting);
        Ok(redemption)
    }

    fn settle(&self, user_id: Uuid, result: AppResult<LedgerPosting>) -> AppResult<LedgerPosting> {
        match result {
            Ok(posting) => {
                self.announce(&posting);
                Ok(posting)
            }
            Err(AppError::InsufficientFunds { balance, required }) => {
                tracing::debug!(
                    user_id = %user_id,
                    balance = balance,
                    required = required,
                    "Debit declined: insufficient Brain Bucks"
                );
                Err(AppError::InsufficientFunds { balance, required })
            }
            Err(e) => Err(e),
        }
    }

    fn announce(&self, posting: &LedgerPosting) {
        tracing::info!(
            user_id = %posting.entry.user_id,
            action_type = %posting.entry.action_type,
            amount = posting.entry.amount,
            balance = posting.balance,
            "Brain Bucks posted"
        );
        self.events.publish(ServerEvent::BalanceChanged {
            user_id: posting.entry.user_id,
            balance: posting.balance,
            delta: posting.entry.amount,
            action_type: posting.entry.action_type.clone(),
        });
    }
}

fn check_movement(amount: i64, action_type: &str) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::Validation(
            "Brain Bucks amount must be a positive whole number".into(),
        ));
    }
    if action_type.trim().is_empty() {
        return Err(AppError::Validation("Action type is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::{RewardRepository, TaskRepository};
    use crate::db::MemoryStore;
    use crate::models::ledger::{ACTION_REWARD_REDEEMED, ACTION_TASK_COMPLETED};
    use crate::models::memory::MemoryType;
    use crate::models::reward::{NewReward, RewardCategory};
    use crate::models::task::NewTask;
    use crate::services::test_support::provisioned_user;

    fn ledger_over(store: &Arc<MemoryStore>) -> PointsLedger {
        PointsLedger::new(store.clone(), EventBus::default(), AwardSchedule::default())
    }

    async fn reward_costing(store: &MemoryStore, user_id: Uuid, cost: i64) -> Uuid {
        store
            .create_reward(
                user_id,
                NewReward {
                    title: "Order a treat".into(),
                    description: None,
                    cost,
                    category: RewardCategory::Treat,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_balance_matches_ledger_after_mixed_sequence() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;

        ledger.credit(user.id, 20, "task_completed", None).await.unwrap();
        ledger.debit(user.id, 7, "reward_redeemed", None).await.unwrap();
        ledger.credit(user.id, 5, "memory_added", Some("Beach")).await.unwrap();
        let _ = ledger.debit(user.id, 100, "reward_redeemed", None).await;
        ledger.debit(user.id, 18, "reward_redeemed", None).await.unwrap();

        let audit = ledger.audit(user.id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.cached_balance, 0);
        assert_eq!(audit.entry_count, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_do_not_lose_updates() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;

        let n = 64;
        let a = 3;
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.credit(user.id, a, "task_completed", None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.balance(user.id).await.unwrap(), n * a);
        let audit = ledger.audit(user.id).await.unwrap();
        assert_eq!(audit.entry_count, n);
        assert!(audit.consistent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        ledger.credit(user.id, 10, "seed", None).await.unwrap();

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.debit(user.id, 1, "reward_redeemed", None).await })
            })
            .collect();
        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(AppError::InsufficientFunds { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(ledger.balance(user.id).await.unwrap(), 0);
        assert!(ledger.audit(user.id).await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        ledger.credit(user.id, 10, "seed", None).await.unwrap();

        let err = ledger
            .debit(user.id, 11, "reward_redeemed", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientFunds {
                balance: 10,
                required: 11
            }
        ));
        let audit = ledger.audit(user.id).await.unwrap();
        assert_eq!(audit.cached_balance, 10);
        assert_eq!(audit.entry_count, 1);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;

        for amount in [0, -5] {
            assert!(matches!(
                ledger.credit(user.id, amount, "seed", None).await,
                Err(AppError::Validation(_))
            ));
            assert!(matches!(
                ledger.debit(user.id, amount, "seed", None).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(ledger.audit(user.id).await.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let err = ledger
            .credit(Uuid::new_v4(), 5, "seed", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_task_completion_awards_points() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        let task = store
            .create_task(
                user.id,
                NewTask {
                    title: "Pay bill".into(),
                    description: None,
                    priority_level: 1,
                    due_date: None,
                },
            )
            .await
            .unwrap();

        let completion = ledger.complete_task(user.id, task.id).await.unwrap();
        assert!(completion.task.is_completed);
        assert!(completion.task.completed_at.is_some());
        assert_eq!(ledger.balance(user.id).await.unwrap(), 5);

        let entries = ledger.history(user.id, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 5);
        assert_eq!(entries[0].action_type, ACTION_TASK_COMPLETED);
        assert_eq!(entries[0].reference_id, Some(task.id));
    }

    #[tokio::test]
    async fn test_completing_twice_awards_once() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        let task = store
            .create_task(
                user.id,
                NewTask {
                    title: "Stretch".into(),
                    description: None,
                    priority_level: 2,
                    due_date: None,
                },
            )
            .await
            .unwrap();

        ledger.complete_task(user.id, task.id).await.unwrap();
        let second = ledger.complete_task(user.id, task.id).await.unwrap();
        assert!(second.posting.is_none());
        assert_eq!(ledger.balance(user.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_memory_logging_awards_points_and_starts_streak() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;

        let logged = ledger
            .log_memory(
                user.id,
                NewMemory {
                    title: "Sunset walk".into(),
                    content: None,
                    entry_date: Utc::now().date_naive(),
                    tags: vec!["outside".into()],
                    emotional_tone: Some("Peaceful".into()),
                    memory_type: MemoryType::Moment,
                },
            )
            .await
            .unwrap();
        assert_eq!(logged.posting.balance, 5);
        assert_eq!(logged.posting.entry.reference_id, Some(logged.memory.id));

        use crate::db::repo::ProfileRepository;
        let profile = store.find_profile_by_auth(user.auth_id).await.unwrap().unwrap();
        assert_eq!(profile.streak_count, 1);
        assert_eq!(profile.last_activity_date, Some(Utc::now().date_naive()));
    }

    #[tokio::test]
    async fn test_redemption_below_balance_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        ledger.credit(user.id, 10, "seed", None).await.unwrap();
        let reward_id = reward_costing(&store, user.id, 50).await;

        let err = ledger.redeem_reward(user.id, reward_id).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { balance: 10, required: 50 }));
        assert_eq!(ledger.balance(user.id).await.unwrap(), 10);

        let rewards = store.list_rewards(user.id).await.unwrap();
        assert!(!rewards[0].is_redeemed);
        assert_eq!(ledger.audit(user.id).await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_redemption_at_exact_balance() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        ledger.credit(user.id, 30, "seed", None).await.unwrap();
        let reward_id = reward_costing(&store, user.id, 30).await;

        let redemption = ledger.redeem_reward(user.id, reward_id).await.unwrap();
        assert!(redemption.reward.is_redeemed);
        assert!(redemption.reward.redeemed_at.is_some());
        assert_eq!(redemption.posting.balance, 0);
        assert_eq!(ledger.balance(user.id).await.unwrap(), 0);

        let debits: Vec<_> = ledger
            .history(user.id, None)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.action_type == ACTION_REWARD_REDEEMED)
            .collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].amount, -30);
    }

    #[tokio::test]
    async fn test_redeeming_twice_is_a_conflict() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        ledger.credit(user.id, 100, "seed", None).await.unwrap();
        let reward_id = reward_costing(&store, user.id, 20).await;

        ledger.redeem_reward(user.id, reward_id).await.unwrap();
        let err = ledger.redeem_reward(user.id, reward_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(ledger.balance(user.id).await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_posting_publishes_balance_event() {
        let store = Arc::new(MemoryStore::new());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let ledger = PointsLedger::new(store.clone(), events, AwardSchedule::default());
        let user = provisioned_user(store.as_ref()).await;

        ledger.credit(user.id, 7, "seed", None).await.unwrap();
        match rx.recv().await.unwrap() {
            ServerEvent::BalanceChanged {
                user_id,
                balance,
                delta,
                ..
            } => {
                assert_eq!(user_id, user.id);
                assert_eq!(balance, 7);
                assert_eq!(delta, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_history_limit_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(&store);
        let user = provisioned_user(store.as_ref()).await;
        for _ in 0..3 {
            ledger.credit(user.id, 1, "seed", None).await.unwrap();
        }
        assert_eq!(ledger.history(user.id, Some(0)).await.unwrap().len(), 1);
        assert_eq!(ledger.history(user.id, Some(1000)).await.unwrap().len(), 3);
    }
}
