use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Preferences {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Reduced-motion switch. Clients render static views when false.
    pub animations_enabled: bool,
    pub theme_mode: ThemeMode,
    pub sound_enabled: bool,
    pub high_contrast: bool,
    pub reminder_frequency: ReminderFrequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preferences {
    pub fn defaults_for(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            animations_enabled: true,
            theme_mode: ThemeMode::default(),
            sound_enabled: true,
            high_contrast: false,
            reminder_frequency: ReminderFrequency::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges the fields present in `patch`.
    pub fn apply(&mut self, patch: &PreferencesPatch) {
        if let Some(v) = patch.animations_enabled {
            self.animations_enabled = v;
        }
        if let Some(v) = patch.theme_mode {
            self.theme_mode = v;
        }
        if let Some(v) = patch.sound_enabled {
            self.sound_enabled = v;
        }
        if let Some(v) = patch.high_contrast {
            self.high_contrast = v;
        }
        if let Some(v) = patch.reminder_frequency {
            self.reminder_frequency = v;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "theme_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "reminder_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReminderFrequency {
    Off,
    #[default]
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesPatch {
    pub animations_enabled: Option<bool>,
    pub theme_mode: Option<ThemeMode>,
    pub sound_enabled: Option<bool>,
    pub high_contrast: Option<bool>,
    pub reminder_frequency: Option<ReminderFrequency>,
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        self.animations_enabled.is_none()
            && self.theme_mode.is_none()
            && self.sound_enabled.is_none()
            && self.high_contrast.is_none()
            && self.reminder_frequency.is_none()
    }
}
