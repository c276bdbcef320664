use axum::{extract::State, http::StatusCode, Extension, Json};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{optional_text, required_text, CreateRewardRequest, RedeemResponse};
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath};
use crate::handlers::current_profile_id;
use crate::models::reward::{find_suggestion, NewReward, Reward, SuggestedReward, SUGGESTED_REWARDS};
use crate::AppState;

/// Active rewards, cheapest first.
pub async fn list_rewards(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Reward>>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    Ok(Json(state.store.list_rewards(user_id).await?))
}

pub async fn create_reward(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<CreateRewardRequest>,
) -> AppResult<(StatusCode, Json<Reward>)> {
    body.validate()?;
    let user_id = current_profile_id(&state, &auth_user).await?;

    let reward = state
        .store
        .create_reward(
            user_id,
            NewReward {
                title: required_text("Title", &body.title)?,
                description: optional_text(body.description),
                cost: body.cost,
                category: body.category.unwrap_or_default(),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reward)))
}

pub async fn list_suggestions() -> Json<&'static [SuggestedReward]> {
    Json(SUGGESTED_REWARDS)
}

/// Adds a built-in template to the caller's vault.
pub async fn create_from_suggestion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(slug): AppPath<String>,
) -> AppResult<(StatusCode, Json<Reward>)> {
    let suggestion = find_suggestion(&slug)
        .ok_or_else(|| AppError::NotFound(format!("No suggested reward '{}'", slug)))?;
    let user_id = current_profile_id(&state, &auth_user).await?;

    let reward = state
        .store
        .create_reward(user_id, suggestion.to_new_reward())
        .await?;
    Ok((StatusCode::CREATED, Json(reward)))
}

/// 409 `insufficient_funds` when the balance is below the cost; nothing changes.
pub async fn redeem_reward(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(reward_id): AppPath<Uuid>,
) -> AppResult<Json<RedeemResponse>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    let redemption = state.ledger.redeem_reward(user_id, reward_id).await?;

    Ok(Json(RedeemResponse {
        spent: -redemption.posting.entry.amount,
        balance: redemption.posting.balance,
        reward: redemption.reward,
    }))
}
