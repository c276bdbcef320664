use axum::{extract::State, Extension, Json};

use crate::auth::middleware::AuthUser;
use crate::dto::{BalanceResponse, LedgerQuery, LedgerResponse};
use crate::error::AppResult;
use crate::extract::AppQuery;
use crate::handlers::current_profile_id;
use crate::models::ledger::BalanceAudit;
use crate::AppState;

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<BalanceResponse>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    let balance = state.ledger.balance(user_id).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

/// Newest first.
pub async fn list_ledger(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<LedgerQuery>,
) -> AppResult<Json<LedgerResponse>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    let entries = state.ledger.history(user_id, query.limit).await?;
    let balance = state.ledger.balance(user_id).await?;
    Ok(Json(LedgerResponse { balance, entries }))
}

pub async fn audit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<BalanceAudit>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    Ok(Json(state.ledger.audit(user_id).await?))
}
