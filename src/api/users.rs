use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::middleware::CurrentUser;
use crate::api::state::AppState;
use crate::error::{AppError, ValidationError};
use crate::ledger::bounded;
use crate::models::{Favorite, User};

const WRONG_CREDENTIALS: &str = "Wrong email - password combination";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// What clients get to see of an account. The wallet secret stays server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub favorites: Vec<Favorite>,
    pub wallet_address: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            favorites: user.favorites.clone(),
            wallet_address: user.wallet.as_ref().map(|w| w.address.clone()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_in_secs: i64,
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

fn session_response(state: &AppState, user: &User) -> SessionResponse {
    SessionResponse {
        token: user.session_token.clone(),
        expires_in_secs: state.sessions.ttl().num_seconds(),
        user: UserView::from(user),
    }
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let mut user = User::new(req.name, req.email, req.password);
    state.users.register(&mut user).await?;

    Ok((StatusCode::CREATED, Json(session_response(&state, &user))))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if req.email.trim().is_empty() {
        return Err(ValidationError::EmailRequired.into());
    }
    if req.password.is_empty() {
        return Err(ValidationError::PasswordRequired.into());
    }

    // Same answer for an unknown email and a wrong password
    let user = match state.users.authenticate(&req.email, &req.password).await {
        Ok(user) => user,
        Err(AppError::NotFound) | Err(AppError::PasswordIncorrect) => {
            tracing::debug!(email = %req.email, "Login rejected");
            return Err(AppError::Unauthenticated(WRONG_CREDENTIALS.to_string()));
        }
        Err(err) => return Err(err),
    };
    tracing::debug!(email = %user.email, "User logged in");

    Ok(Json(session_response(&state, &user)))
}

/// GET /users/favorites (requires auth)
pub async fn favorites(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<Vec<Favorite>> {
    Json(user.favorites)
}

/// GET /users/balance (requires auth)
pub async fn balance(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.users.balance(&user).await?;
    let address = user.wallet.map(|w| w.address).unwrap_or_default();

    Ok(Json(BalanceResponse { address, balance }))
}

/// GET /store/balance
pub async fn store_balance(
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = bounded(
        state.config.ledger_timeout(),
        state.ledger.balance(&state.store_wallet),
    )
    .await
    .map_err(|err| {
        tracing::error!(address = %state.store_wallet, error = %err, "Store balance lookup failed");
        AppError::UpstreamUnavailable(err.to_string())
    })?;

    Ok(Json(BalanceResponse {
        address: state.store_wallet.clone(),
        balance,
    }))
}
