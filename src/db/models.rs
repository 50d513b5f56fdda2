use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::{Favorite, Product, Purchase, PurchaseItem, User, Wallet};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub email: String,
    pub id: String,
    pub name: String,
    pub password_hash: String,
    pub session_token: String,
    /// JSON array of favorite snapshots
    pub favorites: String,
    pub wallet_address: Option<String>,
    pub wallet_secret: Option<String>,
    pub created_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let favorites: Vec<Favorite> = serde_json::from_str(&row.favorites).map_err(|e| {
            AppError::Internal(format!("Corrupt favorites for {}: {}", row.email, e))
        })?;

        let wallet = match (row.wallet_address, row.wallet_secret) {
            (Some(address), Some(secret)) => Some(Wallet { address, secret }),
            _ => None,
        };

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password: String::new(),
            password_hash: row.password_hash,
            session_token: row.session_token,
            favorites,
            wallet,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub quantity: i64,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            price: to_unsigned(row.price, "price")?,
            quantity: to_unsigned(row.quantity, "quantity")?,
            id: row.id,
            name: row.name,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PurchaseRow {
    pub id: String,
    pub email: String,
    /// RFC 3339 with nanoseconds
    pub created_at: String,
    pub item_id: String,
    pub item_name: String,
    pub item_price: i64,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = AppError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| {
                AppError::Internal(format!("Corrupt purchase timestamp {}: {}", row.id, e))
            })?
            .with_timezone(&Utc);

        Ok(Purchase {
            id: row.id,
            email: row.email,
            created_at,
            item: PurchaseItem {
                id: row.item_id,
                name: row.item_name,
                price: to_unsigned(row.item_price, "item_price")?,
            },
        })
    }
}

pub(crate) fn to_unsigned(value: i64, column: &str) -> Result<u64, AppError> {
    u64::try_from(value)
        .map_err(|_| AppError::Internal(format!("Negative {} in store: {}", column, value)))
}

pub(crate) fn to_signed(value: u64, column: &str) -> Result<i64, AppError> {
    i64::try_from(value)
        .map_err(|_| AppError::Internal(format!("{} out of range: {}", column, value)))
}
