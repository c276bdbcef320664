//! # Rememory: Request/Response DTOs
//!
//! API contract types in one module.
//!
//! Conventions:
//! - `*Request`  → deserialized from client JSON body
//! - `*Query`    → deserialized from query params
//! - `*Response` → serialized to client JSON
//! - Field limits are expressed via `validator` derive macros; trimming
//!   happens in the handlers through [`required_text`] and [`optional_text`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::jwt::TokenPair;
use crate::error::{AppError, AppResult};
use crate::models::ledger::LedgerEntry;
use crate::models::memory::{MemoryEntry, MemoryType};
use crate::models::reward::{Reward, RewardCategory};
use crate::models::task::{Task, TaskScope};
use crate::models::user::{Account, Profile};
use crate::services::profile::SessionState;

// ============================================================================
// Common
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Trims `value` and rejects it when nothing is left.
pub fn required_text(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Trims `value`, mapping blank input to `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Auth
// ============================================================================

/// POST /api/auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 254, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    /// Defaults to the local part of the email.
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 50, message = "Nickname must be at most 50 characters"))]
    pub nickname: Option<String>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 neurotype tags"))]
    pub neurotype_tags: Vec<String>,
}

/// POST /api/auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// POST /api/auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct IdentitySummary {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for IdentitySummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            created_at: account.created_at,
        }
    }
}

/// Response for register, login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub identity: IdentitySummary,
    /// Absent while the profile has not been provisioned yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl AuthResponse {
    pub fn new(tokens: TokenPair, account: &Account, profile: Option<Profile>) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            identity: account.into(),
            profile,
        }
    }
}

/// GET /api/auth/session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub identity: Option<IdentitySummary>,
    #[serde(flatten)]
    pub state: SessionState,
}

// ============================================================================
// Profile
// ============================================================================

/// POST /api/me/provision
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProvisionRequest {
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 50, message = "Nickname must be at most 50 characters"))]
    pub nickname: Option<String>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 neurotype tags"))]
    pub neurotype_tags: Vec<String>,
}

/// PUT /api/me (partial update, all fields optional)
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    /// An empty string clears the nickname.
    #[validate(length(max = 50, message = "Nickname must be at most 50 characters"))]
    pub nickname: Option<String>,

    #[validate(length(max = 20, message = "At most 20 neurotype tags"))]
    pub neurotype_tags: Option<Vec<String>>,
}

/// GET /api/me, PUT /api/me
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    /// Nickname when set, otherwise the name.
    pub display_name: String,
    pub is_premium: bool,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            display_name: profile.display_name().to_string(),
            is_premium: profile.subscription_status.is_premium(),
            profile,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub profile: Profile,
    pub created: bool,
}

// ============================================================================
// Brain Bucks
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
}

/// GET /api/brain-bucks/ledger query params
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    /// Default: 50, clamped to 1-200
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub balance: i64,
    pub entries: Vec<LedgerEntry>,
}

// ============================================================================
// Tasks
// ============================================================================

/// GET /api/tasks query params
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// "today" (default) or "all"
    pub scope: Option<TaskScope>,
}

/// POST /api/tasks
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    /// Default: 1
    #[validate(range(min = 1, max = 5, message = "Priority must be 1-5"))]
    pub priority_level: Option<i32>,

    pub due_date: Option<NaiveDate>,
}

/// POST /api/tasks/{id}/complete
#[derive(Debug, Serialize)]
pub struct CompleteTaskResponse {
    pub task: Task,
    /// 0 when the task was already completed.
    pub awarded: i64,
    pub balance: i64,
}

// ============================================================================
// Memories
// ============================================================================

/// POST /api/memories
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMemoryRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Content must be under 10000 characters"))]
    pub content: Option<String>,

    /// Default: today (UTC)
    pub entry_date: Option<NaiveDate>,

    #[serde(default)]
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Vec<String>,

    #[validate(length(max = 50, message = "Emotional tone must be at most 50 characters"))]
    pub emotional_tone: Option<String>,

    /// Default: "moment"
    pub memory_type: Option<MemoryType>,
}

#[derive(Debug, Serialize)]
pub struct MemoryLoggedResponse {
    pub memory: MemoryEntry,
    pub awarded: i64,
    pub balance: i64,
}

// ============================================================================
// Rewards
// ============================================================================

/// POST /api/rewards
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRewardRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 1, message = "Cost must be at least 1 Brain Buck"))]
    pub cost: i64,

    /// Default: "treat"
    pub category: Option<RewardCategory>,
}

/// POST /api/rewards/{id}/redeem
#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub reward: Reward,
    pub spent: i64,
    pub balance: i64,
}
