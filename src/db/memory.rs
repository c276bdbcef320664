use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::repo::{
    AccountRepository, LedgerRepository, MemoryLogged, MemoryRepository, ProfileRepository,
    RewardRedemption, RewardRepository, Store, TaskCompletion, TaskRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::ledger::{LedgerEntry, LedgerPosting, NewLedgerEntry};
use crate::models::memory::{journal_order, MemoryEntry, MemoryFilter, NewMemory};
use crate::models::preferences::{Preferences, PreferencesPatch};
use crate::models::reward::{vault_order, NewReward, Reward};
use crate::models::task::{priority_order, NewTask, Task, TaskFilter, TaskScope};
use crate::models::user::{
    next_streak, Account, NewProfile, Profile, ProfilePatch, Provisioned, RefreshToken,
    SubscriptionStatus,
};

/// In-process store (for single-instance development and tests).
///
/// All tables sit behind one mutex, so every trait method runs as if it were
/// a serializable transaction. Multi-step writes validate everything before
/// touching any table, which keeps failures free of partial state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    users: HashMap<Uuid, Profile>,
    preferences: HashMap<Uuid, Preferences>,
    tasks: HashMap<Uuid, Task>,
    memories: HashMap<Uuid, MemoryEntry>,
    rewards: HashMap<Uuid, Reward>,
    ledger: Vec<LedgerEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn user_mut(&mut self, user_id: Uuid) -> AppResult<&mut Profile> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Balance the entry would produce, without writing anything.
    fn check_entry(&self, entry: &NewLedgerEntry) -> AppResult<i64> {
        let balance = self
            .users
            .get(&entry.user_id)
            .map(|u| u.brain_bucks_balance)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        entry.apply_to(balance)
    }

    fn post_entry(&mut self, entry: NewLedgerEntry) -> AppResult<LedgerPosting> {
        let next = self.check_entry(&entry)?;
        let now = Utc::now();
        let user = self.user_mut(entry.user_id)?;
        user.brain_bucks_balance = next;
        user.updated_at = now;

        let row = entry.into_entry(Uuid::new_v4(), now);
        self.ledger.push(row.clone());
        Ok(LedgerPosting {
            entry: row,
            balance: next,
        })
    }

    fn record_activity(&mut self, user_id: Uuid, today: NaiveDate) -> AppResult<()> {
        let user = self.user_mut(user_id)?;
        user.streak_count = next_streak(user.last_activity_date, user.streak_count, today);
        user.last_activity_date = Some(today);
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> AppResult<Option<Account>> {
        let mut t = self.tables.lock().await;
        if t.accounts.values().any(|a| a.email == email) {
            return Ok(None);
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        t.accounts.insert(account.id, account.clone());
        Ok(Some(account))
    }

    async fn find_account_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let t = self.tables.lock().await;
        Ok(t.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account(&self, account_id: Uuid) -> AppResult<Option<Account>> {
        let t = self.tables.lock().await;
        Ok(t.accounts.get(&account_id).cloned())
    }

    async fn store_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        parent_token_id: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let mut t = self.tables.lock().await;
        let token = RefreshToken {
            id: Uuid::new_v4(),
            account_id,
            token_hash: token_hash.to_string(),
            expires_at,
            revoked: false,
            parent_token_id,
            created_at: Utc::now(),
        };
        let id = token.id;
        t.refresh_tokens.insert(id, token);
        Ok(id)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshToken>> {
        let t = self.tables.lock().await;
        Ok(t.refresh_tokens
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_refresh_token(&self, token_id: Uuid) -> AppResult<()> {
        let mut t = self.tables.lock().await;
        if let Some(token) = t.refresh_tokens.get_mut(&token_id) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, account_id: Uuid) -> AppResult<()> {
        let mut t = self.tables.lock().await;
        t.refresh_tokens
            .values_mut()
            .filter(|r| r.account_id == account_id)
            .for_each(|r| r.revoked = true);
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn find_profile_by_auth(&self, auth_id: Uuid) -> AppResult<Option<Profile>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.auth_id == auth_id).cloned())
    }

    async fn provision_profile(&self, auth_id: Uuid, new: NewProfile) -> AppResult<Provisioned> {
        let mut t = self.tables.lock().await;
        let existing = t.users.values().find(|u| u.auth_id == auth_id).cloned();
        if let Some(existing) = existing {
            t.preferences
                .entry(existing.id)
                .or_insert_with(|| Preferences::defaults_for(existing.id));
            return Ok(Provisioned {
                profile: existing,
                created: false,
            });
        }

        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            auth_id,
            name: new.name,
            nickname: new.nickname,
            neurotype_tags: new.neurotype_tags,
            brain_bucks_balance: 0,
            streak_count: 0,
            last_activity_date: None,
            subscription_status: SubscriptionStatus::Free,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(profile.id, profile.clone());
        t.preferences
            .insert(profile.id, Preferences::defaults_for(profile.id));

        Ok(Provisioned {
            profile,
            created: true,
        })
    }

    async fn update_profile(&self, user_id: Uuid, patch: ProfilePatch) -> AppResult<Profile> {
        let mut t = self.tables.lock().await;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(nickname) = patch.nickname {
            user.nickname = Some(nickname).filter(|n| !n.is_empty());
        }
        if let Some(tags) = patch.neurotype_tags {
            user.neurotype_tags = tags;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn find_preferences(&self, user_id: Uuid) -> AppResult<Option<Preferences>> {
        let t = self.tables.lock().await;
        Ok(t.preferences.get(&user_id).cloned())
    }

    async fn update_preferences(
        &self,
        user_id: Uuid,
        patch: PreferencesPatch,
    ) -> AppResult<Preferences> {
        let mut t = self.tables.lock().await;
        let prefs = t
            .preferences
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("Preferences not found".into()))?;
        prefs.apply(&patch);
        prefs.updated_at = Utc::now();
        Ok(prefs.clone())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn post_entry(&self, entry: NewLedgerEntry) -> AppResult<LedgerPosting> {
        let mut t = self.tables.lock().await;
        t.post_entry(entry)
    }

    async fn cached_balance(&self, user_id: Uuid) -> AppResult<i64> {
        let t = self.tables.lock().await;
        t.users
            .get(&user_id)
            .map(|u| u.brain_bucks_balance)
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn ledger_totals(&self, user_id: Uuid) -> AppResult<(i64, i64)> {
        let t = self.tables.lock().await;
        let (sum, count) = t
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .fold((0i64, 0i64), |(sum, count), e| (sum + e.amount, count + 1));
        Ok((sum, count))
    }

    async fn list_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        let t = self.tables.lock().await;
        // Appended in commit order, so reverse iteration is newest first.
        Ok(t.ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> AppResult<Vec<Task>> {
        let t = self.tables.lock().await;
        let mut tasks: Vec<Task> = t
            .tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .filter(|task| match filter.scope {
                TaskScope::Today => task.is_due_today(filter.today),
                TaskScope::All => true,
            })
            .cloned()
            .collect();
        tasks.sort_by(priority_order);
        if filter.scope == TaskScope::Today {
            tasks.truncate(filter.limit.max(0) as usize);
        }
        Ok(tasks)
    }

    async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<Task> {
        let t = self.tables.lock().await;
        t.tasks
            .get(&task_id)
            .filter(|task| task.user_id == user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Task not found".into()))
    }

    async fn create_task(&self, user_id: Uuid, new: NewTask) -> AppResult<Task> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            description: new.description,
            priority_level: new.priority_level,
            is_completed: false,
            due_date: new.due_date,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn complete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        award: i64,
        today: NaiveDate,
    ) -> AppResult<TaskCompletion> {
        let mut t = self.tables.lock().await;
        let task = t
            .tasks
            .get(&task_id)
            .filter(|task| task.user_id == user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

        if task.is_completed {
            return Ok(TaskCompletion {
                task,
                posting: None,
            });
        }

        let posting = t.post_entry(NewLedgerEntry::task_completed(user_id, task_id, award))?;
        t.record_activity(user_id, today)?;

        let now = Utc::now();
        let task = match t.tasks.get_mut(&task_id) {
            Some(task) => {
                task.is_completed = true;
                task.completed_at = Some(now);
                task.updated_at = now;
                task.clone()
            }
            None => return Err(AppError::NotFound("Task not found".into())),
        };

        Ok(TaskCompletion {
            task,
            posting: Some(posting),
        })
    }
}

#[async_trait]
impl MemoryRepository for MemoryStore {
    async fn list_memories(&self, user_id: Uuid, filter: MemoryFilter) -> AppResult<Vec<MemoryEntry>> {
        let t = self.tables.lock().await;
        let mut memories: Vec<MemoryEntry> = t
            .memories
            .values()
            .filter(|m| m.user_id == user_id && filter.matches(m))
            .cloned()
            .collect();
        memories.sort_by(journal_order);
        Ok(memories)
    }

    async fn log_memory(
        &self,
        user_id: Uuid,
        new: NewMemory,
        award: i64,
        today: NaiveDate,
    ) -> AppResult<MemoryLogged> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let memory = MemoryEntry {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            content: new.content,
            entry_date: new.entry_date,
            tags: new.tags,
            emotional_tone: new.emotional_tone,
            memory_type: new.memory_type,
            created_at: now,
            updated_at: now,
        };

        let posting = t.post_entry(NewLedgerEntry::memory_added(user_id, memory.id, award))?;
        t.record_activity(user_id, today)?;
        t.memories.insert(memory.id, memory.clone());

        Ok(MemoryLogged { memory, posting })
    }
}

#[async_trait]
impl RewardRepository for MemoryStore {
    async fn list_rewards(&self, user_id: Uuid) -> AppResult<Vec<Reward>> {
        let t = self.tables.lock().await;
        let mut rewards: Vec<Reward> = t
            .rewards
            .values()
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .collect();
        rewards.sort_by(vault_order);
        Ok(rewards)
    }

    async fn create_reward(&self, user_id: Uuid, new: NewReward) -> AppResult<Reward> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let reward = Reward {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            description: new.description,
            cost: new.cost,
            category: new.category,
            is_redeemed: false,
            redeemed_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.rewards.insert(reward.id, reward.clone());
        Ok(reward)
    }

    async fn redeem_reward(&self, user_id: Uuid, reward_id: Uuid) -> AppResult<RewardRedemption> {
        let mut t = self.tables.lock().await;
        let reward = t
            .rewards
            .get(&reward_id)
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Reward not found".into()))?;

        if reward.is_redeemed {
            return Err(AppError::Conflict("Reward already redeemed".into()));
        }

        let posting = t.post_entry(NewLedgerEntry::reward_redeemed(&reward))?;

        let now = Utc::now();
        let reward = match t.rewards.get_mut(&reward_id) {
            Some(r) => {
                r.is_redeemed = true;
                r.redeemed_at = Some(now);
                r.updated_at = now;
                r.clone()
            }
            None => return Err(AppError::NotFound("Reward not found".into())),
        };

        Ok(RewardRedemption { reward, posting })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
