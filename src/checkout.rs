//! Checkout orchestration
//!
//! One purchase attempt walks
//! `Start → ProductResolved → BalanceChecked → PaymentExecuted → PurchasePersisted`
//! and stops at the first failure. Only a failure after `PaymentExecuted`
//! leaves the outside world changed: the ledger offers no compensating
//! transfer, so that case is reported as `PostPaymentPersistFailure` for
//! manual reconciliation.
//!
//! Payment and persistence run on their own task, so a caller that gives up
//! (request timeout, client disconnect) cannot cut the purchase record off
//! from a transfer that already happened.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::AppError;
use crate::ledger::{bounded, OracleError, PaymentOracle, TransferReceipt};
use crate::models::{Product, ProductDb, Purchase, PurchaseDb, PurchaseItem, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckoutStage {
    Start,
    ProductResolved,
    BalanceChecked,
    PaymentExecuted,
    PurchasePersisted,
}

#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub purchase: Purchase,
    pub transfer: TransferReceipt,
    /// Stages passed through, in order.
    pub trail: Vec<CheckoutStage>,
}

#[derive(Clone)]
pub struct Checkout {
    products: Arc<dyn ProductDb>,
    purchases: Arc<dyn PurchaseDb>,
    ledger: Arc<dyn PaymentOracle>,
    store_address: String,
    ledger_timeout: Duration,
}

impl Checkout {
    pub fn new(
        products: Arc<dyn ProductDb>,
        purchases: Arc<dyn PurchaseDb>,
        ledger: Arc<dyn PaymentOracle>,
        store_address: impl Into<String>,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            products,
            purchases,
            ledger,
            store_address: store_address.into(),
            ledger_timeout,
        }
    }

    /// Buy one unit of `product_id` for `buyer`.
    pub async fn purchase(
        &self,
        buyer: &User,
        product_id: &str,
    ) -> Result<CheckoutReceipt, AppError> {
        let mut trail = vec![CheckoutStage::Start];

        let product = match self.products.by_id(product_id).await {
            Ok(product) => product,
            Err(AppError::NotFound) => {
                return Err(AppError::ProductNotFound(product_id.to_string()))
            }
            Err(err) => {
                tracing::error!(product_id, error = %err, "Product lookup failed");
                return Err(err);
            }
        };
        trail.push(CheckoutStage::ProductResolved);

        let wallet = buyer.wallet.as_ref().ok_or_else(|| {
            tracing::error!(email = %buyer.email, "Checkout for a user without a ledger account");
            AppError::UpstreamUnavailable("ledger account not opened yet".to_string())
        })?;

        let balance = bounded(self.ledger_timeout, self.ledger.balance(&wallet.address))
            .await
            .map_err(|err| {
                tracing::error!(email = %buyer.email, error = %err, "Balance lookup failed");
                AppError::UpstreamUnavailable(err.to_string())
            })?;

        // Optimistic pre-check; the ledger has the final word at transfer time
        if balance < product.price {
            tracing::debug!(
                email = %buyer.email,
                balance,
                price = product.price,
                "Insufficient funds"
            );
            return Err(AppError::InsufficientFunds {
                balance: Some(balance),
                price: product.price,
            });
        }
        trail.push(CheckoutStage::BalanceChecked);

        // Detached: once the transfer starts, the record write must follow it
        // even if this future is dropped.
        let settle = tokio::spawn(self.clone().settle(
            buyer.email.clone(),
            wallet.secret.clone(),
            product,
        ));
        let (transfer, purchase) = settle
            .await
            .map_err(|e| AppError::Internal(format!("Checkout task failed: {}", e)))??;
        trail.push(CheckoutStage::PaymentExecuted);
        trail.push(CheckoutStage::PurchasePersisted);

        Ok(CheckoutReceipt {
            purchase,
            transfer,
            trail,
        })
    }

    /// Transfer the price to the store and record the purchase.
    async fn settle(
        self,
        email: String,
        source_secret: String,
        product: Product,
    ) -> Result<(TransferReceipt, Purchase), AppError> {
        let transfer = bounded(
            self.ledger_timeout,
            self.ledger
                .transfer(&source_secret, &self.store_address, product.price),
        )
        .await
        .map_err(|err| self.transfer_failed(&email, product.price, err))?;
        tracing::info!(
            email = %email,
            product_id = %product.id,
            amount = product.price,
            transfer_reference = %transfer.reference,
            "Payment executed"
        );

        let mut purchase = Purchase::draft(&email, PurchaseItem::from(&product));
        if let Err(err) = self.purchases.create(&mut purchase).await {
            let payload = serde_json::to_string(&purchase)
                .unwrap_or_else(|e| format!("<unserializable purchase: {}>", e));
            tracing::error!(
                transfer_reference = %transfer.reference,
                purchase = %payload,
                error = %err,
                "PAYMENT EXECUTED BUT PURCHASE NOT PERSISTED - manual reconciliation required"
            );
            return Err(AppError::PostPaymentPersistFailure {
                transfer_reference: transfer.reference,
                purchase: Box::new(purchase),
                reason: err.to_string(),
            });
        }
        tracing::info!(email = %email, purchase_id = %purchase.id, "Purchase persisted");

        Ok((transfer, purchase))
    }

    fn transfer_failed(&self, email: &str, price: u64, err: OracleError) -> AppError {
        match err {
            // Balance moved between the pre-check and the transfer
            OracleError::InsufficientFunds => {
                tracing::debug!(email, price, "Ledger refused transfer for insufficient funds");
                AppError::InsufficientFunds {
                    balance: None,
                    price,
                }
            }
            OracleError::Timeout(_) => {
                tracing::error!(
                    email,
                    destination = %self.store_address,
                    amount = price,
                    error = %err,
                    "Transfer timed out; its outcome on the ledger is unknown"
                );
                AppError::UpstreamUnavailable(err.to_string())
            }
            other => {
                tracing::error!(email, amount = price, error = %other, "Transfer failed");
                AppError::from(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::ErrorKind;
    use crate::ledger::MemoryLedger;
    use crate::models::{purchase_service, Product, Wallet};
    use async_trait::async_trait;

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
        store_wallet: Wallet,
        buyer: User,
        checkout: Checkout,
    }

    fn lamp() -> Product {
        Product {
            id: "p-1".to_string(),
            name: "Lamp".to_string(),
            price: 500,
            quantity: 10,
        }
    }

    async fn fixture(buyer_balance: u64) -> Fixture {
        let store = Arc::new(MemoryStore::with_products([lamp()]));
        let ledger = Arc::new(MemoryLedger::new(0));
        let store_wallet = ledger.open_account().await.unwrap();
        let buyer_wallet = ledger.open_account().await.unwrap();
        ledger.set_balance(&buyer_wallet.address, buyer_balance).await;

        let buyer = User {
            wallet: Some(buyer_wallet),
            ..User::new("Juan", "juan@mail.com", "")
        };
        let checkout = Checkout::new(
            store.clone(),
            purchase_service(store.clone()),
            ledger.clone(),
            store_wallet.address.clone(),
            Duration::from_secs(1),
        );

        Fixture {
            store,
            ledger,
            store_wallet,
            buyer,
            checkout,
        }
    }

    #[tokio::test]
    async fn test_successful_checkout_walks_every_stage() {
        let f = fixture(1_000).await;

        let receipt = f.checkout.purchase(&f.buyer, "p-1").await.unwrap();

        assert_eq!(
            receipt.trail,
            vec![
                CheckoutStage::Start,
                CheckoutStage::ProductResolved,
                CheckoutStage::BalanceChecked,
                CheckoutStage::PaymentExecuted,
                CheckoutStage::PurchasePersisted,
            ]
        );
        assert_eq!(receipt.purchase.item.price, 500);
        assert_eq!(receipt.purchase.email, "juan@mail.com");
        assert!(!receipt.purchase.id.is_empty());

        let history = PurchaseDb::by_email(f.store.as_ref(), "juan@mail.com").await.unwrap();
        assert_eq!(history, vec![receipt.purchase.clone()]);

        let transfers = f.ledger.transfers().await;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, 500);
        assert_eq!(transfers[0].destination, f.store_wallet.address);
        assert_eq!(transfers[0].reference, receipt.transfer.reference);

        let wallet = f.buyer.wallet.as_ref().unwrap();
        assert_eq!(f.ledger.balance(&wallet.address).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_purchase_snapshot_ignores_later_price_changes() {
        let f = fixture(1_000).await;
        let receipt = f.checkout.purchase(&f.buyer, "p-1").await.unwrap();

        f.store
            .insert_product(Product {
                price: 9_999,
                ..lamp()
            })
            .await;

        let history = PurchaseDb::by_email(f.store.as_ref(), "juan@mail.com").await.unwrap();
        assert_eq!(history[0].item.price, 500);
        assert_eq!(history[0], receipt.purchase);
    }

    #[tokio::test]
    async fn test_insufficient_funds_stops_before_payment() {
        let f = fixture(100).await;

        let err = f.checkout.purchase(&f.buyer, "p-1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert!(matches!(err, AppError::InsufficientFunds { balance: Some(100), price: 500 }));
        assert!(f.ledger.transfers().await.is_empty());
        assert_eq!(f.store.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_product_fails_before_balance_check() {
        let f = fixture(1_000).await;
        // Any ledger call would now fail with UpstreamUnavailable
        f.ledger.set_available(false);

        let err = f.checkout.purchase(&f.buyer, "p-404").await.unwrap_err();

        assert!(matches!(err, AppError::ProductNotFound(ref id) if id == "p-404"));
        assert_eq!(f.store.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_ledger_outage_is_upstream_unavailable() {
        let f = fixture(1_000).await;
        f.ledger.set_available(false);

        let err = f.checkout.purchase(&f.buyer, "p-1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(f.store.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_buyer_without_wallet() {
        let f = fixture(1_000).await;
        let buyer = User::new("Ana", "ana@mail.com", "");

        let err = f.checkout.purchase(&buyer, "p-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    /// Reports a healthy balance but refuses every transfer.
    struct StaleBalanceLedger;

    #[async_trait]
    impl PaymentOracle for StaleBalanceLedger {
        async fn open_account(&self) -> Result<Wallet, OracleError> {
            Err(OracleError::Unavailable("not supported".to_string()))
        }

        async fn balance(&self, _address: &str) -> Result<u64, OracleError> {
            Ok(1_000_000)
        }

        async fn transfer(&self, _: &str, _: &str, _: u64) -> Result<TransferReceipt, OracleError> {
            Err(OracleError::InsufficientFunds)
        }
    }

    #[tokio::test]
    async fn test_ledger_refusal_at_transfer_is_insufficient_funds() {
        let f = fixture(1_000).await;
        let checkout = Checkout::new(
            f.store.clone(),
            purchase_service(f.store.clone()),
            Arc::new(StaleBalanceLedger),
            "GSTORE",
            Duration::from_secs(1),
        );

        let err = checkout.purchase(&f.buyer, "p-1").await.unwrap_err();

        assert!(matches!(err, AppError::InsufficientFunds { balance: None, price: 500 }));
        assert_eq!(f.store.purchase_count().await, 0);
    }

    /// Ledger whose balance call never answers in time.
    struct HangingLedger;

    #[async_trait]
    impl PaymentOracle for HangingLedger {
        async fn open_account(&self) -> Result<Wallet, OracleError> {
            Err(OracleError::Unavailable("not supported".to_string()))
        }

        async fn balance(&self, _address: &str) -> Result<u64, OracleError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(0)
        }

        async fn transfer(&self, _: &str, _: &str, _: u64) -> Result<TransferReceipt, OracleError> {
            Err(OracleError::Unavailable("not supported".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ledger_is_bounded_by_timeout() {
        let f = fixture(1_000).await;
        let checkout = Checkout::new(
            f.store.clone(),
            purchase_service(f.store.clone()),
            Arc::new(HangingLedger),
            "GSTORE",
            Duration::from_secs(2),
        );

        let err = checkout.purchase(&f.buyer, "p-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    /// Purchase store that refuses every write.
    struct BrokenPurchaseStore;

    #[async_trait]
    impl PurchaseDb for BrokenPurchaseStore {
        async fn by_email(&self, _email: &str) -> Result<Vec<Purchase>, AppError> {
            Ok(Vec::new())
        }

        async fn create(&self, _purchase: &mut Purchase) -> Result<(), AppError> {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_persist_failure_after_payment_is_distinct() {
        let f = fixture(1_000).await;
        let checkout = Checkout::new(
            f.store.clone(),
            purchase_service(Arc::new(BrokenPurchaseStore)),
            f.ledger.clone(),
            f.store_wallet.address.clone(),
            Duration::from_secs(1),
        );

        let err = checkout.purchase(&f.buyer, "p-1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PostPaymentPersistFailure);
        let transfers = f.ledger.transfers().await;
        assert_eq!(transfers.len(), 1);
        match err {
            AppError::PostPaymentPersistFailure {
                transfer_reference,
                purchase,
                ..
            } => {
                assert_eq!(transfer_reference, transfers[0].reference);
                assert_eq!(purchase.email, "juan@mail.com");
                assert_eq!(purchase.item.price, 500);
                assert!(!purchase.id.is_empty());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    /// Purchase store whose writes take a long time to land.
    struct SlowPurchaseStore {
        inner: Arc<MemoryStore>,
        delay: Duration,
    }

    #[async_trait]
    impl PurchaseDb for SlowPurchaseStore {
        async fn by_email(&self, email: &str) -> Result<Vec<Purchase>, AppError> {
            PurchaseDb::by_email(self.inner.as_ref(), email).await
        }

        async fn create(&self, purchase: &mut Purchase) -> Result<(), AppError> {
            tokio::time::sleep(self.delay).await;
            PurchaseDb::create(self.inner.as_ref(), purchase).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_checkout_still_records_the_payment() {
        let f = fixture(1_000).await;
        let slow = Arc::new(SlowPurchaseStore {
            inner: f.store.clone(),
            delay: Duration::from_secs(5),
        });
        let checkout = Checkout::new(
            f.store.clone(),
            purchase_service(slow),
            f.ledger.clone(),
            f.store_wallet.address.clone(),
            Duration::from_secs(1),
        );

        // Caller gives up while the purchase record is still being written
        let outcome =
            tokio::time::timeout(Duration::from_secs(2), checkout.purchase(&f.buyer, "p-1")).await;
        assert!(outcome.is_err());
        assert_eq!(f.ledger.transfers().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(f.store.purchase_count().await, 1);
        let history = PurchaseDb::by_email(f.store.as_ref(), "juan@mail.com")
            .await
            .unwrap();
        assert_eq!(history[0].item.price, 500);
    }
}
