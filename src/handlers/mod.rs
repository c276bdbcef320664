use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::AppState;

pub mod auth;
pub mod brain_bucks;
pub mod health;
pub mod memories;
pub mod profile;
pub mod rewards;
pub mod tasks;
pub mod ws;

/// Profile id of the signed-in identity; `NotFound` until provisioned.
pub(crate) async fn current_profile_id(state: &AppState, auth_user: &AuthUser) -> AppResult<Uuid> {
    Ok(state.profiles.load_profile(auth_user.id).await?.id)
}
