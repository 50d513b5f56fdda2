use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::pipeline::Pipeline;
use crate::models::Purchase;

/// Keyed access to stored purchases.
#[async_trait]
pub trait PurchaseDb: Send + Sync {
    /// All purchases made by `email`, oldest first.
    async fn by_email(&self, email: &str) -> Result<Vec<Purchase>, AppError>;

    async fn create(&self, purchase: &mut Purchase) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStep {
    SetCreationTime,
    DeriveId,
}

pub const CREATE_STEPS: &[PurchaseStep] = &[PurchaseStep::SetCreationTime, PurchaseStep::DeriveId];

/// Fills in server-assigned fields before a purchase reaches storage.
pub struct PurchaseValidator {
    inner: Arc<dyn PurchaseDb>,
    /// Last assigned creation time in Unix nanoseconds.
    last_assigned: AtomicI64,
}

impl PurchaseValidator {
    pub fn new(inner: Arc<dyn PurchaseDb>) -> Self {
        Self {
            inner,
            last_assigned: AtomicI64::new(i64::MIN),
        }
    }

    /// Wall-clock time, bumped so that every call gets a strictly later
    /// timestamp than the one before it.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let previous = match self.last_assigned.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last.saturating_add(1))),
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        Utc.timestamp_nanos(now.max(previous.saturating_add(1)))
    }
}

/// Compose the purchase domain service over a raw store.
pub fn purchase_service(store: Arc<dyn PurchaseDb>) -> Arc<dyn PurchaseDb> {
    Arc::new(PurchaseValidator::new(store))
}

/// Content hash over (email, item, timestamp), hex encoded.
pub fn derive_purchase_id(purchase: &Purchase) -> String {
    let mut hasher = Sha256::new();
    hasher.update(purchase.email.as_bytes());
    hasher.update([0u8]);
    hasher.update(purchase.item.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(purchase.item.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(purchase.item.price.to_be_bytes());
    hasher.update(
        purchase
            .created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

#[async_trait]
impl Pipeline<Purchase> for PurchaseValidator {
    type Step = PurchaseStep;

    async fn apply(&self, step: PurchaseStep, purchase: &mut Purchase) -> Result<(), AppError> {
        match step {
            PurchaseStep::SetCreationTime => purchase.created_at = self.next_timestamp(),
            PurchaseStep::DeriveId => purchase.id = derive_purchase_id(purchase),
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseDb for PurchaseValidator {
    async fn by_email(&self, email: &str) -> Result<Vec<Purchase>, AppError> {
        self.inner.by_email(&crate::models::normalize_email(email)).await
    }

    async fn create(&self, purchase: &mut Purchase) -> Result<(), AppError> {
        self.run(purchase, CREATE_STEPS).await?;
        self.inner.create(purchase).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::PurchaseItem;

    fn item() -> PurchaseItem {
        PurchaseItem {
            id: "p-1".to_string(),
            name: "Lamp".to_string(),
            price: 500,
        }
    }

    #[test]
    fn test_id_is_deterministic_over_content() {
        let mut a = Purchase::draft("juan@mail.com", item());
        a.created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a.clone();

        assert_eq!(derive_purchase_id(&a), derive_purchase_id(&b));
        assert_eq!(derive_purchase_id(&a).len(), 32);

        let mut later = a.clone();
        later.created_at = later.created_at + chrono::Duration::nanoseconds(1);
        assert_ne!(derive_purchase_id(&a), derive_purchase_id(&later));

        let mut other_buyer = a.clone();
        other_buyer.email = "ana@mail.com".to_string();
        assert_ne!(derive_purchase_id(&a), derive_purchase_id(&other_buyer));
    }

    #[tokio::test]
    async fn test_create_assigns_time_then_id() {
        let store = Arc::new(MemoryStore::new());
        let purchases = purchase_service(store);
        let before = Utc::now();

        let mut purchase = Purchase::draft("juan@mail.com", item());
        purchases.create(&mut purchase).await.unwrap();

        assert!(purchase.created_at >= before);
        assert_eq!(purchase.id, derive_purchase_id(&purchase));

        let stored = purchases.by_email("juan@mail.com").await.unwrap();
        assert_eq!(stored, vec![purchase]);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let validator = PurchaseValidator::new(Arc::new(MemoryStore::new()));
        let stamps: Vec<_> = (0..1_000).map(|_| validator.next_timestamp()).collect();

        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_history_is_per_owner() {
        let store = Arc::new(MemoryStore::new());
        let purchases = purchase_service(store);

        purchases.create(&mut Purchase::draft("juan@mail.com", item())).await.unwrap();
        purchases.create(&mut Purchase::draft("juan@mail.com", item())).await.unwrap();
        purchases.create(&mut Purchase::draft("ana@mail.com", item())).await.unwrap();

        assert_eq!(purchases.by_email("JUAN@mail.com").await.unwrap().len(), 2);
        assert_eq!(purchases.by_email("ana@mail.com").await.unwrap().len(), 1);
        assert!(purchases.by_email("nobody@mail.com").await.unwrap().is_empty());
    }
}
