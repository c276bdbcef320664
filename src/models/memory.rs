use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub entry_date: NaiveDate,
    pub tags: Vec<String>,
    pub emotional_tone: Option<String>,
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "memory_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Moment,
    Meal,
    Anchor,
}

#[derive(Debug, Clone)]
pub struct NewMemory {
    pub title: String,
    pub content: Option<String>,
    pub entry_date: NaiveDate,
    pub tags: Vec<String>,
    pub emotional_tone: Option<String>,
    pub memory_type: MemoryType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryFilter {
    pub memory_type: Option<MemoryType>,
    pub tag: Option<String>,
}

impl MemoryFilter {
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(kind) = self.memory_type {
            if entry.memory_type != kind {
                return false;
            }
        }
        match &self.tag {
            Some(tag) => entry.tags.iter().any(|t| t == tag),
            None => true,
        }
    }
}

/// Newest entry date first, newest insert first within a day.
pub fn journal_order(a: &MemoryEntry, b: &MemoryEntry) -> std::cmp::Ordering {
    b.entry_date
        .cmp(&a.entry_date)
        .then(b.created_at.cmp(&a.created_at))
}
