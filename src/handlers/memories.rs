use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{optional_text, required_text, CreateMemoryRequest, MemoryLoggedResponse};
use crate::error::AppResult;
use crate::extract::{AppJson, AppQuery};
use crate::handlers::current_profile_id;
use crate::models::memory::{MemoryEntry, MemoryFilter, NewMemory};
use crate::models::user::normalize_tags;
use crate::AppState;

/// Newest first. Optional `memory_type` and `tag` query filters.
pub async fn list_memories(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(filter): AppQuery<MemoryFilter>,
) -> AppResult<Json<Vec<MemoryEntry>>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    let filter = MemoryFilter {
        memory_type: filter.memory_type,
        tag: optional_text(filter.tag),
    };
    Ok(Json(state.store.list_memories(user_id, filter).await?))
}

pub async fn create_memory(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<CreateMemoryRequest>,
) -> AppResult<(StatusCode, Json<MemoryLoggedResponse>)> {
    body.validate()?;
    let user_id = current_profile_id(&state, &auth_user).await?;

    let new = NewMemory {
        title: required_text("Title", &body.title)?,
        content: optional_text(body.content),
        entry_date: body.entry_date.unwrap_or_else(|| Utc::now().date_naive()),
        tags: normalize_tags(body.tags),
        emotional_tone: optional_text(body.emotional_tone),
        memory_type: body.memory_type.unwrap_or_default(),
    };
    let logged = state.ledger.log_memory(user_id, new).await?;

    Ok((
        StatusCode::CREATED,
        Json(MemoryLoggedResponse {
            awarded: logged.posting.entry.amount,
            balance: logged.posting.balance,
            memory: logged.memory,
        }),
    ))
}
