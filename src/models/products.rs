use async_trait::async_trait;

use crate::error::AppError;
use crate::models::Product;

/// Read-only access to the product catalog.
#[async_trait]
pub trait ProductDb: Send + Sync {
    /// Look up a product by id, `AppError::NotFound` on a miss.
    async fn by_id(&self, id: &str) -> Result<Product, AppError>;
}
