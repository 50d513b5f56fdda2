use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::AppError;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::NotFound | AppError::ProductNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::PasswordIncorrect | AppError::Unauthenticated(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::AuthorizationDenied => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            AppError::UpstreamUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable".to_string(),
            ),
            AppError::PostPaymentPersistFailure {
                transfer_reference, ..
            } => {
                let body = serde_json::json!({
                    "error": "Payment was taken but the purchase could not be recorded",
                    "reference": transfer_reference,
                });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
