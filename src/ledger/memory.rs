use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{OracleError, PaymentOracle, TransferReceipt};
use crate::models::Wallet;

/// A transfer executed by the in-process ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub reference: String,
    pub source: String,
    pub destination: String,
    pub amount: u64,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, u64>,
    /// secret -> address
    secrets: HashMap<String, String>,
    transfers: Vec<TransferRecord>,
}

/// In-process ledger for development and tests.
///
/// New accounts are funded with `starting_balance`, like a testnet faucet.
pub struct MemoryLedger {
    starting_balance: u64,
    available: AtomicBool,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(starting_balance: u64) -> Self {
        Self {
            starting_balance,
            available: AtomicBool::new(true),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` while false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn set_balance(&self, address: &str, amount: u64) {
        self.state
            .lock()
            .await
            .balances
            .insert(address.to_string(), amount);
    }

    pub async fn transfers(&self) -> Vec<TransferRecord> {
        self.state.lock().await.transfers.clone()
    }

    fn check_available(&self) -> Result<(), OracleError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OracleError::Unavailable("in-memory ledger is offline".to_string()))
        }
    }
}

#[async_trait]
impl PaymentOracle for MemoryLedger {
    async fn open_account(&self) -> Result<Wallet, OracleError> {
        self.check_available()?;

        let wallet = Wallet {
            address: format!("G{}", Uuid::new_v4().simple()).to_uppercase(),
            secret: format!("S{}", Uuid::new_v4().simple()).to_uppercase(),
        };

        let mut state = self.state.lock().await;
        state
            .balances
            .insert(wallet.address.clone(), self.starting_balance);
        state
            .secrets
            .insert(wallet.secret.clone(), wallet.address.clone());

        Ok(wallet)
    }

    async fn balance(&self, address: &str) -> Result<u64, OracleError> {
        self.check_available()?;

        self.state
            .lock()
            .await
            .balances
            .get(address)
            .copied()
            .ok_or_else(|| OracleError::UnknownAccount(address.to_string()))
    }

    async fn transfer(
        &self,
        source_secret: &str,
        destination: &str,
        amount: u64,
    ) -> Result<TransferReceipt, OracleError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        let source = state
            .secrets
            .get(source_secret)
            .cloned()
            .ok_or_else(|| OracleError::Rejected("source credential not recognised".to_string()))?;
        if !state.balances.contains_key(destination) {
            return Err(OracleError::UnknownAccount(destination.to_string()));
        }

        let available = state.balances.get(&source).copied().unwrap_or(0);
        if available < amount {
            return Err(OracleError::InsufficientFunds);
        }

        state.balances.insert(source.clone(), available - amount);
        *state.balances.entry(destination.to_string()).or_insert(0) += amount;

        let reference = Uuid::new_v4().to_string();
        state.transfers.push(TransferRecord {
            reference: reference.clone(),
            source,
            destination: destination.to_string(),
            amount,
        });

        Ok(TransferReceipt { reference })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_accounts_are_funded() {
        let ledger = MemoryLedger::new(10_000);
        let wallet = ledger.open_account().await.unwrap();

        assert_eq!(ledger.balance(&wallet.address).await.unwrap(), 10_000);
        assert_ne!(wallet.address, wallet.secret);
    }

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let ledger = MemoryLedger::new(1_000);
        let buyer = ledger.open_account().await.unwrap();
        let store = ledger.open_account().await.unwrap();

        let receipt = ledger.transfer(&buyer.secret, &store.address, 400).await.unwrap();

        assert_eq!(ledger.balance(&buyer.address).await.unwrap(), 600);
        assert_eq!(ledger.balance(&store.address).await.unwrap(), 1_400);
        let transfers = ledger.transfers().await;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].reference, receipt.reference);
    }

    #[tokio::test]
    async fn test_overdraft_is_refused() {
        let ledger = MemoryLedger::new(100);
        let buyer = ledger.open_account().await.unwrap();
        let store = ledger.open_account().await.unwrap();

        let result = ledger.transfer(&buyer.secret, &store.address, 101).await;

        assert_eq!(result, Err(OracleError::InsufficientFunds));
        assert_eq!(ledger.balance(&buyer.address).await.unwrap(), 100);
        assert!(ledger.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_ledger() {
        let ledger = MemoryLedger::new(100);
        ledger.set_available(false);

        assert!(matches!(ledger.open_account().await, Err(OracleError::Unavailable(_))));
        assert!(matches!(ledger.balance("G1").await, Err(OracleError::Unavailable(_))));
    }
}
