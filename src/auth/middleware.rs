use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use uuid::Uuid;

use crate::auth::jwt::{verify_token, TokenType};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// The signed-in identity. `id` is the account id; the profile is looked up
/// from it on demand.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Resolves a bearer access token from the headers.
pub fn authenticate(headers: &HeaderMap, config: &Config) -> AppResult<AuthUser> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(AppError::unauthorized)?;
    authenticate_token(bearer.token(), config)
}

pub fn authenticate_token(token: &str, config: &Config) -> AppResult<AuthUser> {
    let token_data = verify_token(token, config)?;
    if token_data.claims.token_type != TokenType::Access {
        return Err(AppError::Authentication("Access token required".into()));
    }
    Ok(AuthUser {
        id: token_data.claims.sub,
        email: token_data.claims.email,
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_user = authenticate(req.headers(), &state.config)?;
    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}
