use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::api::middleware::CurrentUser;
use crate::api::state::AppState;
use crate::error::{AppError, ValidationError};
use crate::models::{Favorite, FavoriteOutcome, Product};

/// Body naming a product by id.
#[derive(Debug, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub id: String,
}

impl ProductRef {
    /// The trimmed id, rejected when blank.
    pub fn id(&self) -> Result<&str, AppError> {
        match self.id.trim() {
            "" => Err(ValidationError::ProductIdRequired.into()),
            id => Ok(id),
        }
    }
}

pub(crate) async fn resolve(state: &AppState, id: &str) -> Result<Product, AppError> {
    match state.products.by_id(id).await {
        Ok(product) => Ok(product),
        Err(AppError::NotFound) => Err(AppError::ProductNotFound(id.to_string())),
        Err(err) => Err(err),
    }
}

/// GET /products/:id (requires auth)
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(resolve(&state, &id).await?))
}

/// POST /products/favorites (requires auth)
///
/// 201 with the snapshot on first add, 304 when the product is already a favorite.
pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ProductRef>,
) -> Result<Response, AppError> {
    let product = resolve(&state, req.id()?).await?;
    let favorite = Favorite::from(&product);

    match state.users.add_favorite(&user, favorite.clone()).await? {
        FavoriteOutcome::Added => {
            tracing::debug!(email = %user.email, product_id = %favorite.id, "Favorite added");
            Ok((StatusCode::CREATED, Json(favorite)).into_response())
        }
        FavoriteOutcome::AlreadyFavorite => Ok(StatusCode::NOT_MODIFIED.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_ref_requires_an_id() {
        for blank in ["", "   "] {
            let req = ProductRef {
                id: blank.to_string(),
            };
            assert!(matches!(
                req.id(),
                Err(AppError::Validation(ValidationError::ProductIdRequired))
            ));
        }

        let req = ProductRef {
            id: " p-1 ".to_string(),
        };
        assert_eq!(req.id().unwrap(), "p-1");
    }
}
