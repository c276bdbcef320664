use axum::{extract::State, http::HeaderMap, Extension, Json};
use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    jwt::{create_token_pair, hash_token, verify_token, TokenPair, TokenType},
    middleware::{authenticate, AuthUser},
    password::{hash_password, verify_password},
};
use crate::dto::{
    optional_text, AuthResponse, IdentitySummary, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, SessionResponse,
};
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::models::user::{Account, NewProfile};
use crate::services::events::{ServerEvent, SessionChange};
use crate::services::profile::SessionState;
use crate::AppState;

fn invalid_credentials() -> AppError {
    AppError::Authentication("Invalid email or password".into())
}

/// Mints a token pair and persists the refresh token's hash.
async fn issue_token_pair(
    state: &AppState,
    account: &Account,
    parent_token_id: Option<Uuid>,
) -> AppResult<TokenPair> {
    let tokens = create_token_pair(account.id, &account.email, &state.config)?;
    let expires_at = Utc::now() + Duration::seconds(state.config.jwt_refresh_ttl_secs);
    state
        .store
        .store_refresh_token(
            account.id,
            &hash_token(&tokens.refresh_token),
            expires_at,
            parent_token_id,
        )
        .await?;
    Ok(tokens)
}

fn announce(state: &AppState, account_id: Uuid, change: SessionChange) {
    state.events.publish(ServerEvent::SessionChanged { account_id, change });
}

/// Display name when none was given at sign-up: the email's local part.
fn fallback_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    body.validate()?;

    let email = body.email.trim().to_lowercase();
    let password_hash = hash_password(&body.password)?;
    let account = state
        .store
        .create_account(&email, &password_hash)
        .await?
        .ok_or_else(|| AppError::Conflict("Email already registered".into()))?;

    let name = optional_text(body.name).unwrap_or_else(|| fallback_name(&email));
    let provisioned = state
        .profiles
        .provision_profile(
            account.id,
            NewProfile {
                name,
                nickname: body.nickname,
                neurotype_tags: body.neurotype_tags,
            },
        )
        .await?;

    let tokens = issue_token_pair(&state, &account, None).await?;
    tracing::info!(account_id = %account.id, "Account registered");
    announce(&state, account.id, SessionChange::SignedIn);

    Ok(Json(AuthResponse::new(
        tokens,
        &account,
        Some(provisioned.profile),
    )))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    body.validate()?;

    let email = body.email.trim().to_lowercase();
    let account = state
        .store
        .find_account_by_email(&email)
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&body.password, &account.password_hash)? {
        tracing::debug!(account_id = %account.id, "Password mismatch");
        return Err(invalid_credentials());
    }

    let tokens = issue_token_pair(&state, &account, None).await?;
    let profile = state.store.find_profile_by_auth(account.id).await?;
    announce(&state, account.id, SessionChange::SignedIn);

    Ok(Json(AuthResponse::new(tokens, &account, profile)))
}

/// Single-use rotation. Presenting an already rotated token revokes every
/// refresh token of the account.
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(body): AppJson<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let token_data = verify_token(&body.refresh_token, &state.config)?;
    if token_data.claims.token_type != TokenType::Refresh {
        return Err(AppError::Authentication("Refresh token required".into()));
    }

    let stored = state
        .store
        .find_refresh_token(&hash_token(&body.refresh_token))
        .await?
        .ok_or_else(AppError::unauthorized)?;

    if stored.revoked {
        tracing::warn!(
            account_id = %stored.account_id,
            token_id = %stored.id,
            "Refresh token reuse detected, revoking all tokens for account"
        );
        state
            .store
            .revoke_all_refresh_tokens(stored.account_id)
            .await?;
        announce(&state, stored.account_id, SessionChange::SignedOut);
        return Err(AppError::Authentication(
            "Your session has expired. Please sign in again.".into(),
        ));
    }

    if stored.account_id != token_data.claims.sub || stored.expires_at <= Utc::now() {
        return Err(AppError::unauthorized());
    }

    let account = state
        .store
        .find_account(stored.account_id)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    state.store.revoke_refresh_token(stored.id).await?;
    let tokens = issue_token_pair(&state, &account, Some(stored.id)).await?;
    let profile = state.store.find_profile_by_auth(account.id).await?;
    announce(&state, account.id, SessionChange::TokenRefreshed);

    Ok(Json(AuthResponse::new(tokens, &account, profile)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<MessageResponse>> {
    state.store.revoke_all_refresh_tokens(auth_user.id).await?;
    announce(&state, auth_user.id, SessionChange::SignedOut);
    Ok(Json(MessageResponse {
        message: "Signed out".into(),
    }))
}

/// Current identity and provisioning state. Never fails on a bad or missing
/// token; that is reported as `unauthenticated`.
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<SessionResponse>> {
    let account = match authenticate(&headers, &state.config) {
        Ok(auth_user) => state.store.find_account(auth_user.id).await?,
        Err(_) => None,
    };

    let Some(account) = account else {
        return Ok(Json(SessionResponse {
            identity: None,
            state: SessionState::Unauthenticated,
        }));
    };

    let session_state = state.profiles.session_state(Some(account.id)).await?;
    Ok(Json(SessionResponse {
        identity: Some(IdentitySummary::from(&account)),
        state: session_state,
    }))
}
