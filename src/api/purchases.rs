use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::api::middleware::CurrentUser;
use crate::api::products::ProductRef;
use crate::api::state::AppState;
use crate::error::AppError;
use crate::models::Purchase;

/// POST /purchases (requires auth)
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ProductRef>,
) -> Result<(StatusCode, Json<Purchase>), AppError> {
    let receipt = state.checkout.purchase(&user, req.id()?).await?;
    tracing::debug!(
        purchase_id = %receipt.purchase.id,
        trail = ?receipt.trail,
        "Checkout complete"
    );

    Ok((StatusCode::CREATED, Json(receipt.purchase)))
}

/// GET /purchases (requires auth)
pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<Purchase>>, AppError> {
    Ok(Json(state.purchases.by_email(&user.email).await?))
}
