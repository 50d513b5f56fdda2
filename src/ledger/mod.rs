//! External payment ledger
//!
//! The ledger is the sole authority on balances and on whether a transfer
//! happened. Calls are slow and may fail; nothing here retries.

pub mod http;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::models::Wallet;

pub use http::HttpLedger;
pub use memory::MemoryLedger;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("insufficient funds on source account")]
    InsufficientFunds,

    #[error("unknown ledger account {0}")]
    UnknownAccount(String),

    #[error("ledger rejected the request: {0}")]
    Rejected(String),
}

impl From<OracleError> for AppError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::InsufficientFunds => AppError::InsufficientFunds {
                balance: None,
                price: 0,
            },
            OracleError::Unavailable(_) | OracleError::Timeout(_) => {
                AppError::UpstreamUnavailable(err.to_string())
            }
            OracleError::UnknownAccount(_) | OracleError::Rejected(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

/// Proof that the ledger executed a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
}

#[async_trait]
pub trait PaymentOracle: Send + Sync {
    /// Open and fund a new account.
    async fn open_account(&self) -> Result<Wallet, OracleError>;

    /// Current balance of `address` in the smallest currency unit.
    async fn balance(&self, address: &str) -> Result<u64, OracleError>;

    /// Move `amount` from the account unlocked by `source_secret` to
    /// `destination`. Irreversible once it returns `Ok`.
    async fn transfer(
        &self,
        source_secret: &str,
        destination: &str,
        amount: u64,
    ) -> Result<TransferReceipt, OracleError>;
}

/// Run a ledger call with an upper bound on how long it may take.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(timeout)),
    }
}
