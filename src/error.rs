use thiserror::Error;

use crate::models::Purchase;

/// Coarse classification of every failure the core can report.
///
/// The HTTP layer maps these to status codes; nothing below it knows about HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    Unauthenticated,
    AuthorizationDenied,
    ProductNotFound,
    InsufficientFunds,
    UpstreamUnavailable,
    PostPaymentPersistFailure,
    Internal,
}

/// Reasons a candidate entity is rejected by a validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("email address is required")]
    EmailRequired,

    #[error("email address is not valid")]
    EmailInvalid,

    #[error("email address is already taken")]
    EmailTaken,

    #[error("password is required")]
    PasswordRequired,

    #[error("password must be at least 8 characters long")]
    PasswordTooShort,

    #[error("name is required")]
    NameRequired,

    #[error("product id is required")]
    ProductIdRequired,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("resource not found")]
    NotFound,

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("incorrect password provided")]
    PasswordIncorrect,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("action not permitted")]
    AuthorizationDenied,

    #[error("product {0} not found at the store's stock")]
    ProductNotFound(String),

    #[error("insufficient funds to pay {price}")]
    InsufficientFunds { balance: Option<u64>, price: u64 },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Funds moved on the ledger but the purchase record could not be written.
    #[error(
        "payment {transfer_reference} executed but purchase {} was not persisted: {reason}",
        .purchase.id
    )]
    PostPaymentPersistFailure {
        transfer_reference: String,
        purchase: Box<Purchase>,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound => ErrorKind::NotFound,
            AppError::Validation(_) => ErrorKind::ValidationFailed,
            AppError::PasswordIncorrect | AppError::Unauthenticated(_) => {
                ErrorKind::Unauthenticated
            }
            AppError::AuthorizationDenied => ErrorKind::AuthorizationDenied,
            AppError::ProductNotFound(_) => ErrorKind::ProductNotFound,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::UpstreamUnavailable(_) | AppError::Database(_) => {
                ErrorKind::UpstreamUnavailable
            }
            AppError::PostPaymentPersistFailure { .. } => ErrorKind::PostPaymentPersistFailure,
            AppError::Config(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Expected business outcomes, returned to callers untranslated and never
    /// logged as errors.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::ValidationFailed
                | ErrorKind::Unauthenticated
                | ErrorKind::AuthorizationDenied
                | ErrorKind::ProductNotFound
                | ErrorKind::InsufficientFunds
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
