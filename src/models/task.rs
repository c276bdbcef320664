use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_PRIORITY: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority_level: i32,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Open and either undated or due on or before `today`; overdue tasks stay
    /// on the list.
    pub fn is_due_today(&self, today: NaiveDate) -> bool {
        !self.is_completed && self.due_date.map_or(true, |d| d <= today)
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority_level: i32,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskScope {
    /// The "Critical Compass" window: a handful of open tasks for today.
    #[default]
    Today,
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskFilter {
    pub scope: TaskScope,
    pub today: NaiveDate,
    pub limit: i64,
}

/// Ordering shared by every backend: highest priority first, oldest first on ties.
pub fn priority_order(a: &Task, b: &Task) -> std::cmp::Ordering {
    b.priority_level
        .cmp(&a.priority_level)
        .then(a.created_at.cmp(&b.created_at))
}
