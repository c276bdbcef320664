use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub cost: i64,
    pub category: RewardCategory,
    pub is_redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "reward_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RewardCategory {
    #[default]
    Treat,
    Activity,
    Rest,
    Social,
}

#[derive(Debug, Clone)]
pub struct NewReward {
    pub title: String,
    pub description: Option<String>,
    pub cost: i64,
    pub category: RewardCategory,
}

/// Built-in reward template offered to every user.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SuggestedReward {
    pub slug: &'static str,
    pub title: &'static str,
    pub cost: i64,
    pub category: RewardCategory,
}

impl SuggestedReward {
    pub fn to_new_reward(&self) -> NewReward {
        NewReward {
            title: self.title.to_string(),
            description: None,
            cost: self.cost,
            category: self.category,
        }
    }
}

pub const SUGGESTED_REWARDS: &[SuggestedReward] = &[
    SuggestedReward {
        slug: "watch-a-show",
        title: "Watch a show",
        cost: 10,
        category: RewardCategory::Activity,
    },
    SuggestedReward {
        slug: "order-a-treat",
        title: "Order a treat",
        cost: 50,
        category: RewardCategory::Treat,
    },
    SuggestedReward {
        slug: "nap-without-guilt",
        title: "Nap without guilt",
        cost: 15,
        category: RewardCategory::Rest,
    },
    SuggestedReward {
        slug: "swap-a-chore",
        title: "Swap a chore",
        cost: 30,
        category: RewardCategory::Activity,
    },
    SuggestedReward {
        slug: "call-a-friend",
        title: "Call a friend",
        cost: 20,
        category: RewardCategory::Social,
    },
    SuggestedReward {
        slug: "bath-with-candles",
        title: "Bath with candles",
        cost: 25,
        category: RewardCategory::Rest,
    },
];

pub fn find_suggestion(slug: &str) -> Option<&'static SuggestedReward> {
    SUGGESTED_REWARDS.iter().find(|s| s.slug == slug)
}

/// Cheapest first; ties keep creation order.
pub fn vault_order(a: &Reward, b: &Reward) -> std::cmp::Ordering {
    a.cost.cmp(&b.cost).then(a.created_at.cmp(&b.created_at))
}
