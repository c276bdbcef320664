use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{optional_text, required_text, CompleteTaskResponse, CreateTaskRequest, TaskListQuery};
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::handlers::current_profile_id;
use crate::models::task::{NewTask, Task, TaskFilter, MIN_PRIORITY};
use crate::AppState;

/// `scope=today` (default) is the short Critical Compass list; `scope=all`
/// returns everything.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<TaskListQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    let filter = TaskFilter {
        scope: query.scope.unwrap_or_default(),
        today: Utc::now().date_naive(),
        limit: state.config.today_task_limit,
    };
    Ok(Json(state.store.list_tasks(user_id, filter).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    body.validate()?;
    let user_id = current_profile_id(&state, &auth_user).await?;

    let task = state
        .store
        .create_task(
            user_id,
            NewTask {
                title: required_text("Title", &body.title)?,
                description: optional_text(body.description),
                priority_level: body.priority_level.unwrap_or(MIN_PRIORITY),
                due_date: body.due_date,
            },
        )
        .await?;

    tracing::debug!(user_id = %user_id, task_id = %task.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(task_id): AppPath<Uuid>,
) -> AppResult<Json<Task>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    Ok(Json(state.store.get_task(user_id, task_id).await?))
}

/// Completing an already completed task is not an error; it awards nothing.
pub async fn complete_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(task_id): AppPath<Uuid>,
) -> AppResult<Json<CompleteTaskResponse>> {
    let user_id = current_profile_id(&state, &auth_user).await?;
    let completion = state.ledger.complete_task(user_id, task_id).await?;

    let (awarded, balance) = match &completion.posting {
        Some(posting) => (posting.entry.amount, posting.balance),
        None => (0, state.ledger.balance(user_id).await?),
    };
    Ok(Json(CompleteTaskResponse {
        task: completion.task,
        awarded,
        balance,
    }))
}
