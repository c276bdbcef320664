use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity-provider record. One account owns at most one profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub auth_id: Uuid,
    pub name: String,
    pub nickname: Option<String>,
    pub neurotype_tags: Vec<String>,
    pub brain_bucks_balance: i64,
    pub streak_count: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub subscription_status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// The name shown in greetings: nickname when set, otherwise the full name.
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Active,
}

impl SubscriptionStatus {
    pub fn is_premium(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Attributes supplied when a profile is first provisioned.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub nickname: Option<String>,
    pub neurotype_tags: Vec<String>,
}

/// Owner-editable profile fields. Balance, streak and subscription are
/// deliberately absent: they only move through the ledger or billing.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub neurotype_tags: Option<Vec<String>>,
}

/// Result of a provisioning call; `created` is false when the profile already existed.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub profile: Profile,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[allow(dead_code)]
pub struct RefreshToken {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub parent_token_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Streak after recording activity on `today`.
///
/// Same-day activity keeps the streak, activity on the following day extends
/// it, anything else starts over at one.
pub fn next_streak(last_activity: Option<NaiveDate>, current: i32, today: NaiveDate) -> i32 {
    match last_activity {
        Some(last) if last == today => current.max(1),
        Some(last) if last.succ_opt() == Some(today) => current + 1,
        _ => 1,
    }
}

/// Normalizes free-text labels: trims, drops empties, removes duplicates
/// while keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}
