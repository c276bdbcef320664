use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{
    optional_text, ProfileResponse, ProvisionRequest, ProvisionResponse, UpdateProfileRequest,
};
use crate::error::AppResult;
use crate::extract::AppJson;
use crate::models::preferences::{Preferences, PreferencesPatch};
use crate::models::user::{NewProfile, ProfilePatch};
use crate::AppState;

pub async fn get_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state.profiles.load_profile(auth_user.id).await?;
    Ok(Json(profile.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    body.validate()?;
    let profile = state
        .profiles
        .update_profile(
            auth_user.id,
            ProfilePatch {
                name: body.name,
                nickname: body.nickname,
                neurotype_tags: body.neurotype_tags,
            },
        )
        .await?;
    Ok(Json(profile.into()))
}

/// POST /api/me/provision: 201 on first call, 200 afterwards. The body is
/// optional; a malformed one is still rejected.
pub async fn provision(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Result<Json<ProvisionRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ProvisionResponse>)> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => ProvisionRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    body.validate()?;

    let name = optional_text(body.name).unwrap_or_else(|| {
        auth_user
            .email
            .split('@')
            .next()
            .unwrap_or("Friend")
            .to_string()
    });
    let provisioned = state
        .profiles
        .provision_profile(
            auth_user.id,
            NewProfile {
                name,
                nickname: body.nickname,
                neurotype_tags: body.neurotype_tags,
            },
        )
        .await?;

    let status = if provisioned.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ProvisionResponse {
            profile: provisioned.profile,
            created: provisioned.created,
        }),
    ))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Preferences>> {
    Ok(Json(state.profiles.load_preferences(auth_user.id).await?))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(patch): AppJson<PreferencesPatch>,
) -> AppResult<Json<Preferences>> {
    Ok(Json(
        state
            .profiles
            .update_preferences(auth_user.id, patch)
            .await?,
    ))
}
