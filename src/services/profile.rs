use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repo::Store;
use crate::error::{AppError, AppResult};
use crate::models::preferences::{Preferences, PreferencesPatch};
use crate::models::user::{normalize_tags, NewProfile, Profile, ProfilePatch, Provisioned};

pub const MAX_NAME_LEN: usize = 100;

/// Where a caller stands in the sign-up flow. `provision_profile` moves an
/// identity from `NoProfile` to `Ready`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    NoProfile,
    Ready {
        profile: Profile,
        preferences: Preferences,
    },
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn load_profile(&self, auth_id: Uuid) -> AppResult<Profile> {
        self.store
            .find_profile_by_auth(auth_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".into()))
    }

    /// Safe to call repeatedly and concurrently: the first call creates the
    /// profile with default preferences, later calls return it unchanged.
    pub async fn provision_profile(&self, auth_id: Uuid, new: NewProfile) -> AppResult<Provisioned> {
        if let Some(profile) = self.store.find_profile_by_auth(auth_id).await? {
            return Ok(Provisioned {
                profile,
                created: false,
            });
        }

        let name = clean_name(&new.name)?;
        let provisioned = self
            .store
            .provision_profile(
                auth_id,
                NewProfile {
                    name,
                    nickname: clean_nickname(new.nickname),
                    neurotype_tags: normalize_tags(new.neurotype_tags),
                },
            )
            .await?;

        if provisioned.created {
            tracing::info!(
                auth_id = %auth_id,
                user_id = %provisioned.profile.id,
                "Profile provisioned"
            );
        }
        Ok(provisioned)
    }

    pub async fn update_profile(&self, auth_id: Uuid, patch: ProfilePatch) -> AppResult<Profile> {
        let profile = self.load_profile(auth_id).await?;
        let patch = ProfilePatch {
            name: patch.name.as_deref().map(clean_name).transpose()?,
            // An explicit empty nickname clears it.
            nickname: patch.nickname.map(|n| n.trim().to_string()),
            neurotype_tags: patch.neurotype_tags.map(normalize_tags),
        };
        self.store.update_profile(profile.id, patch).await
    }

    pub async fn load_preferences(&self, auth_id: Uuid) -> AppResult<Preferences> {
        let profile = self.load_profile(auth_id).await?;
        self.store
            .find_preferences(profile.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Preferences not found".into()))
    }

    pub async fn update_preferences(
        &self,
        auth_id: Uuid,
        patch: PreferencesPatch,
    ) -> AppResult<Preferences> {
        if patch.is_empty() {
            return self.load_preferences(auth_id).await;
        }
        let profile = self.load_profile(auth_id).await?;
        self.store.update_preferences(profile.id, patch).await
    }

    pub async fn session_state(&self, auth_id: Option<Uuid>) -> AppResult<SessionState> {
        let Some(auth_id) = auth_id else {
            return Ok(SessionState::Unauthenticated);
        };
        let Some(profile) = self.store.find_profile_by_auth(auth_id).await? else {
            return Ok(SessionState::NoProfile);
        };
        let preferences = match self.store.find_preferences(profile.id).await? {
            Some(p) => p,
            None => return Ok(SessionState::NoProfile),
        };
        Ok(SessionState::Ready {
            profile,
            preferences,
        })
    }
}

fn clean_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn clean_nickname(nickname: Option<String>) -> Option<String> {
    nickname
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
