use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::db::models::{to_signed, ProductRow};
use crate::error::AppError;
use crate::models::{Product, ProductDb};

/// Products table. The catalog is maintained outside this service; the
/// upsert exists for seeding.
pub struct SqliteProductDb {
    pool: Pool<Sqlite>,
}

impl SqliteProductDb {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, product: &Product) -> Result<(), AppError> {
        sqlx::query(
            r#"
INSERT INTO products (id, name, price, quantity)
VALUES (?, ?, ?, ?)
ON CONFLICT (id) DO UPDATE
SET name = excluded.name, price = excluded.price, quantity = excluded.quantity
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(to_signed(product.price, "price")?)
        .bind(to_signed(product.quantity, "quantity")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProductDb for SqliteProductDb {
    async fn by_id(&self, id: &str) -> Result<Product, AppError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, quantity FROM products WHERE id = ?",
        )
        .bind(id.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        Product::try_from(row)
    }
}
