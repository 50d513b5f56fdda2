use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::api::state::AppState;
use crate::error::AppError;
use crate::models::User;

const BEARER: &str = "Bearer ";

/// Identity resolved by [`require_user`], available to handlers as an
/// `Extension<CurrentUser>`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Pull the credential out of an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header
        .ok_or_else(|| AppError::Unauthenticated("Missing Authorization header".to_string()))?;

    // Scheme name is case-insensitive
    let token = match header.get(..BEARER.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER) => header[BEARER.len()..].trim(),
        _ => {
            return Err(AppError::Unauthenticated(
                "Invalid Authorization format".to_string(),
            ))
        }
    };

    if token.is_empty() {
        return Err(AppError::Unauthenticated("Missing bearer token".to_string()));
    }
    Ok(token)
}

/// Authorization gate for identity-scoped routes.
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let token = bearer_token(header)?;

    let email = state.sessions.verify(token)?;

    let user = match state.users.by_email(&email).await {
        Ok(user) => user,
        Err(AppError::NotFound) => {
            tracing::debug!(email = %email, "Token subject no longer exists");
            return Err(AppError::Unauthenticated("Unknown account".to_string()));
        }
        Err(err) => return Err(err),
    };

    if state.config.enforce_latest_token && user.session_token != token {
        return Err(AppError::Unauthenticated(
            "session: token superseded".to_string(),
        ));
    }

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}
