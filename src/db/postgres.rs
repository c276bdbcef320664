use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::repo::{
    AccountRepository, LedgerRepository, MemoryLogged, MemoryRepository, ProfileRepository,
    RewardRedemption, RewardRepository, Store, TaskCompletion, TaskRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::ledger::{LedgerEntry, LedgerPosting, NewLedgerEntry};
use crate::models::memory::{MemoryEntry, MemoryFilter, NewMemory};
use crate::models::preferences::{Preferences, PreferencesPatch};
use crate::models::reward::{NewReward, Reward};
use crate::models::task::{NewTask, Task, TaskFilter, TaskScope};
use crate::models::user::{
    next_streak, Account, NewProfile, Profile, ProfilePatch, Provisioned, RefreshToken,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Posts one ledger entry on an open transaction.
///
/// The user row is locked first so concurrent postings for the same user
/// queue behind each other instead of reading the same balance.
async fn post_entry_locked(conn: &mut PgConnection, entry: NewLedgerEntry) -> AppResult<LedgerPosting> {
    let balance = sqlx::query_scalar::<_, i64>(
        "SELECT brain_bucks_balance FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(entry.user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let next = entry.apply_to(balance)?;

    let row = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO brain_bucks_ledger (id, user_id, action_type, amount, description, reference_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, clock_timestamp())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(&entry.action_type)
    .bind(entry.amount)
    .bind(&entry.description)
    .bind(entry.reference_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE users SET brain_bucks_balance = $2, updated_at = NOW() WHERE id = $1")
        .bind(entry.user_id)
        .bind(next)
        .execute(&mut *conn)
        .await?;

    Ok(LedgerPosting {
        entry: row,
        balance: next,
    })
}

/// Advances the streak counters. Must run after `post_entry_locked` so the
/// user row is already locked.
async fn record_activity(conn: &mut PgConnection, user_id: Uuid, today: NaiveDate) -> AppResult<()> {
    let (streak, last) = sqlx::query_as::<_, (i32, Option<NaiveDate>)>(
        "SELECT streak_count, last_activity_date FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE users SET streak_count = $2, last_activity_date = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(user_id)
    .bind(next_streak(last, streak, today))
    .bind(today)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_account_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_account(&self, account_id: Uuid) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn store_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        parent_token_id: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, account_id, token_hash, expires_at, parent_token_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(account_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(parent_token_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshToken>> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, account_id, token_hash, expires_at, revoked, parent_token_id, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn revoke_refresh_token(&self, token_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked = true, revoked_at = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, account_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = NOW()
            WHERE account_id = $1 AND revoked = false
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for PgStore {
    async fn find_profile_by_auth(&self, auth_id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM users WHERE auth_id = $1")
            .bind(auth_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn provision_profile(&self, auth_id: Uuid, new: NewProfile) -> AppResult<Provisioned> {
        let mut tx = self.pool.begin().await?;

        // UNIQUE(auth_id) makes a raced second insert a no-op.
        let inserted = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO users (id, auth_id, name, nickname, neurotype_tags)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (auth_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(auth_id)
        .bind(&new.name)
        .bind(&new.nickname)
        .bind(&new.neurotype_tags)
        .fetch_optional(&mut *tx)
        .await?;

        let (profile, created) = match inserted {
            Some(profile) => (profile, true),
            None => {
                let existing = sqlx::query_as::<_, Profile>("SELECT * FROM users WHERE auth_id = $1")
                    .bind(auth_id)
                    .fetch_one(&mut *tx)
                    .await?;
                (existing, false)
            }
        };

        sqlx::query(
            r#"
            INSERT INTO user_preferences (id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(profile.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Provisioned { profile, created })
    }

    async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> AppResult<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                nickname = NULLIF(COALESCE($3, nickname), ''),
                neurotype_tags = COALESCE($4, neurotype_tags),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&patch.name)
        .bind(&patch.nickname)
        .bind(&patch.neurotype_tags)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;

        Ok(profile)
    }

    async fn find_preferences(&self, user_id: Uuid) -> AppResult<Option<Preferences>> {
        let prefs = sqlx::query_as::<_, Preferences>(
            "SELECT * FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prefs)
    }

    async fn update_preferences(
        &self,
        user_id: Uuid,
        patch: PreferencesPatch,
    ) -> AppResult<Preferences> {
        let prefs = sqlx::query_as::<_, Preferences>(
            r#"
            UPDATE user_preferences SET
                animations_enabled = COALESCE($2, animations_enabled),
                theme_mode = COALESCE($3, theme_mode),
                sound_enabled = COALESCE($4, sound_enabled),
                high_contrast = COALESCE($5, high_contrast),
                reminder_frequency = COALESCE($6, reminder_frequency),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(patch.animations_enabled)
        .bind(patch.theme_mode)
        .bind(patch.sound_enabled)
        .bind(patch.high_contrast)
        .bind(patch.reminder_frequency)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Preferences not found".into()))?;

        Ok(prefs)
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn post_entry(&self, entry: NewLedgerEntry) -> AppResult<LedgerPosting> {
        let mut tx = self.pool.begin().await?;
        let posting = post_entry_locked(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(posting)
    }

    async fn cached_balance(&self, user_id: Uuid) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT brain_bucks_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn ledger_totals(&self, user_id: Uuid) -> AppResult<(i64, i64)> {
        let totals = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT, COUNT(*)
            FROM brain_bucks_ledger
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn list_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM brain_bucks_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[async_trait]
impl TaskRepository for PgStore {
    async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> AppResult<Vec<Task>> {
        let tasks = match filter.scope {
            TaskScope::Today => {
                sqlx::query_as::<_, Task>(
                    r#"
                    SELECT * FROM tasks
                    WHERE user_id = $1
                      AND is_completed = false
                      AND (due_date IS NULL OR due_date <= $2)
                    ORDER BY priority_level DESC, created_at ASC
                    LIMIT $3
                    "#,
                )
                .bind(user_id)
                .bind(filter.today)
                .bind(filter.limit)
                .fetch_all(&self.pool)
                .await?
            }
            TaskScope::All => {
                sqlx::query_as::<_, Task>(
                    r#"
                    SELECT * FROM tasks
                    WHERE user_id = $1
                    ORDER BY priority_level DESC, created_at ASC
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(tasks)
    }

    async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<Task> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".into()))
    }

    async fn create_task(&self, user_id: Uuid, new: NewTask) -> AppResult<Task> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, user_id, title, description, priority_level, due_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.priority_level)
        .bind(new.due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn complete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        award: i64,
        today: NaiveDate,
    ) -> AppResult<TaskCompletion> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

        if task.is_completed {
            return Ok(TaskCompletion {
                task,
                posting: None,
            });
        }

        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks SET
                is_completed = true,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(task_id)
        .fetch_one(&mut *tx)
        .await?;

        let posting =
            post_entry_locked(&mut tx, NewLedgerEntry::task_completed(user_id, task_id, award)).await?;
        record_activity(&mut tx, user_id, today).await?;

        tx.commit().await?;

        Ok(TaskCompletion {
            task,
            posting: Some(posting),
        })
    }
}

#[async_trait]
impl MemoryRepository for PgStore {
    async fn list_memories(&self, user_id: Uuid, filter: MemoryFilter) -> AppResult<Vec<MemoryEntry>> {
        let memories = sqlx::query_as::<_, MemoryEntry>(
            r#"
            SELECT * FROM memory_entries
            WHERE user_id = $1
              AND ($2::memory_type IS NULL OR memory_type = $2)
              AND ($3::text IS NULL OR $3 = ANY(tags))
            ORDER BY entry_date DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(filter.memory_type)
        .bind(&filter.tag)
        .fetch_all(&self.pool)
        .await?;
        Ok(memories)
    }

    async fn log_memory(
        &self,
        user_id: Uuid,
        new: NewMemory,
        award: i64,
        today: NaiveDate,
    ) -> AppResult<MemoryLogged> {
        let mut tx = self.pool.begin().await?;

        let memory = sqlx::query_as::<_, MemoryEntry>(
            r#"
            INSERT INTO memory_entries (id, user_id, title, content, entry_date, tags, emotional_tone, memory_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.entry_date)
        .bind(&new.tags)
        .bind(&new.emotional_tone)
        .bind(new.memory_type)
        .fetch_one(&mut *tx)
        .await?;

        let posting =
            post_entry_locked(&mut tx, NewLedgerEntry::memory_added(user_id, memory.id, award)).await?;
        record_activity(&mut tx, user_id, today).await?;

        tx.commit().await?;

        Ok(MemoryLogged { memory, posting })
    }
}

#[async_trait]
impl RewardRepository for PgStore {
    async fn list_rewards(&self, user_id: Uuid) -> AppResult<Vec<Reward>> {
        let rewards = sqlx::query_as::<_, Reward>(
            r#"
            SELECT * FROM brain_buck_rewards
            WHERE user_id = $1 AND is_active = true
            ORDER BY cost ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rewards)
    }

    async fn create_reward(&self, user_id: Uuid, new: NewReward) -> AppResult<Reward> {
        let reward = sqlx::query_as::<_, Reward>(
            r#"
            INSERT INTO brain_buck_rewards (id, user_id, title, description, cost, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.cost)
        .bind(new.category)
        .fetch_one(&self.pool)
        .await?;
        Ok(reward)
    }

    async fn redeem_reward(&self, user_id: Uuid, reward_id: Uuid) -> AppResult<RewardRedemption> {
        let mut tx = self.pool.begin().await?;

        let reward = sqlx::query_as::<_, Reward>(
            r#"
            SELECT * FROM brain_buck_rewards
            WHERE id = $1 AND user_id = $2 AND is_active = true
            FOR UPDATE
            "#,
        )
        .bind(reward_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Reward not found".into()))?;

        if reward.is_redeemed {
            return Err(AppError::Conflict("Reward already redeemed".into()));
        }

        let posting = post_entry_locked(&mut tx, NewLedgerEntry::reward_redeemed(&reward)).await?;

        let reward = sqlx::query_as::<_, Reward>(
            r#"
            UPDATE brain_buck_rewards SET
                is_redeemed = true,
                redeemed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(reward_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RewardRedemption { reward, posting })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// These run against a real database: `DATABASE_URL=... cargo test -- --ignored`.
/// `sqlx::test` creates a fresh database per test and applies the migrations.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reward::RewardCategory;

    async fn store_with_user(pool: PgPool) -> (PgStore, Profile) {
        let store = PgStore::new(pool);
        let account = store
            .create_account(&format!("{}@example.com", Uuid::new_v4()), "hash")
            .await
            .unwrap()
            .unwrap();
        let profile = store
            .provision_profile(
                account.id,
                NewProfile {
                    name: "Riley".into(),
                    nickname: None,
                    neurotype_tags: vec![],
                },
            )
            .await
            .unwrap()
            .profile;
        (store, profile)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_concurrent_credits_are_serialized(pool: PgPool) {
        let (store, user) = store_with_user(pool).await;
        let user_id = user.id;

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .post_entry(NewLedgerEntry::credit(user_id, 3, "task_completed", None))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.cached_balance(user.id).await.unwrap(), 96);
        assert_eq!(store.ledger_totals(user.id).await.unwrap(), (96, 32));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_concurrent_debits_never_overdraw(pool: PgPool) {
        let (store, user) = store_with_user(pool).await;
        store
            .post_entry(NewLedgerEntry::credit(user.id, 10, "seed", None))
            .await
            .unwrap();
        let user_id = user.id;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .post_entry(NewLedgerEntry::debit(user_id, 1, "spend", None))
                        .await
                })
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
        assert_eq!(store.cached_balance(user.id).await.unwrap(), 0);
        assert_eq!(store.ledger_totals(user.id).await.unwrap(), (0, 11));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_overdraw_writes_nothing(pool: PgPool) {
        let (store, user) = store_with_user(pool).await;
        store
            .post_entry(NewLedgerEntry::credit(user.id, 10, "seed", None))
            .await
            .unwrap();

        let err = store
            .post_entry(NewLedgerEntry::debit(user.id, 11, "spend", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { balance: 10, required: 11 }));
        assert_eq!(store.cached_balance(user.id).await.unwrap(), 10);
        assert_eq!(store.ledger_totals(user.id).await.unwrap(), (10, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_redemption_below_balance_rolls_back(pool: PgPool) {
        let (store, user) = store_with_user(pool).await;
        store
            .post_entry(NewLedgerEntry::credit(user.id, 10, "seed", None))
            .await
            .unwrap();
        let reward = store
            .create_reward(
                user.id,
                NewReward {
                    title: "Movie night".into(),
                    description: None,
                    cost: 50,
                    category: RewardCategory::Activity,
                },
            )
            .await
            .unwrap();

        let err = store.redeem_reward(user.id, reward.id).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { balance: 10, required: 50 }));

        let rewards = store.list_rewards(user.id).await.unwrap();
        assert_eq!(rewards.len(), 1);
        assert!(!rewards[0].is_redeemed);
        assert!(rewards[0].redeemed_at.is_none());
        assert_eq!(store.ledger_totals(user.id).await.unwrap(), (10, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_concurrent_provisioning_creates_one_row(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let account = store
            .create_account("once@example.com", "hash")
            .await
            .unwrap()
            .unwrap();
        let auth_id = account.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .provision_profile(
                            auth_id,
                            NewProfile {
                                name: "Riley".into(),
                                nickname: None,
                                neurotype_tags: vec![],
                            },
                        )
                        .await
                })
            })
            .collect();
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let (users, prefs) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE auth_id = $1),
                (SELECT COUNT(*) FROM user_preferences p JOIN users u ON u.id = p.user_id
                 WHERE u.auth_id = $1)
            "#,
        )
        .bind(account.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((users, prefs), (1, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn test_history_follows_commit_order(pool: PgPool) {
        let (store, user) = store_with_user(pool).await;
        for amount in [1, 2, 3] {
            store
                .post_entry(NewLedgerEntry::credit(user.id, amount, "seed", None))
                .await
                .unwrap();
        }
        let amounts: Vec<i64> = store
            .list_entries(user.id, 10)
            .await
            .unwrap()
            .iter()
            .map(|e| e.amount)
            .collect();
        assert_eq!(amounts, vec![3, 2, 1]);
    }
}
