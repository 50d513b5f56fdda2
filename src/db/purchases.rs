use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::{Pool, Sqlite};

use crate::db::models::{to_signed, PurchaseRow};
use crate::error::AppError;
use crate::models::{Purchase, PurchaseDb};

/// Purchases table, keyed by the content-derived id.
pub struct SqlitePurchaseDb {
    pool: Pool<Sqlite>,
}

impl SqlitePurchaseDb {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseDb for SqlitePurchaseDb {
    async fn by_email(&self, email: &str) -> Result<Vec<Purchase>, AppError> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
SELECT id, email, created_at, item_id, item_name, item_price
FROM purchases
WHERE email = ?
ORDER BY created_at ASC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Purchase::try_from).collect()
    }

    async fn create(&self, purchase: &mut Purchase) -> Result<(), AppError> {
        sqlx::query(
            r#"
INSERT INTO purchases (id, email, created_at, item_id, item_name, item_price)
VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.email)
        .bind(purchase.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .bind(&purchase.item.id)
        .bind(&purchase.item.name)
        .bind(to_signed(purchase.item.price, "item_price")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::PurchaseItem;
    use chrono::{TimeZone, Utc};

    fn purchase(id: &str, email: &str, second: u32) -> Purchase {
        Purchase {
            id: id.to_string(),
            email: email.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
            item: PurchaseItem {
                id: "p-1".to_string(),
                name: "Lamp".to_string(),
                price: 500,
            },
        }
    }

    #[tokio::test]
    async fn test_query_by_owner_in_creation_order() {
        let db = SqlitePurchaseDb::new(test_pool().await);
        let mut later = purchase("b", "juan@mail.com", 30);
        let mut earlier = purchase("a", "juan@mail.com", 10);
        let mut someone_else = purchase("c", "ana@mail.com", 20);
        db.create(&mut later).await.unwrap();
        db.create(&mut earlier).await.unwrap();
        db.create(&mut someone_else).await.unwrap();

        let history = db.by_email("juan@mail.com").await.unwrap();
        assert_eq!(history, vec![earlier, later]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_refused() {
        let db = SqlitePurchaseDb::new(test_pool().await);
        db.create(&mut purchase("a", "juan@mail.com", 10)).await.unwrap();

        assert!(db.create(&mut purchase("a", "juan@mail.com", 10)).await.is_err());
    }
}
