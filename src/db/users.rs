use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::db::models::UserRow;
use crate::error::{AppError, ValidationError};
use crate::models::{PatchOutcome, User, UserDb, UserPatch};

/// Users table, keyed by email.
pub struct SqliteUserDb {
    pool: Pool<Sqlite>,
}

impl SqliteUserDb {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn exists(&self, email: &str) -> Result<bool, AppError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }
}

#[async_trait]
impl UserDb for SqliteUserDb {
    async fn by_email(&self, email: &str) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound)?;

        User::try_from(row)
    }

    async fn create(&self, user: &mut User) -> Result<(), AppError> {
        let favorites = serde_json::to_string(&user.favorites)
            .map_err(|e| AppError::Internal(format!("Failed to encode favorites: {}", e)))?;
        let (wallet_address, wallet_secret) = match &user.wallet {
            Some(wallet) => (Some(wallet.address.as_str()), Some(wallet.secret.as_str())),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
INSERT INTO users (
    email, id, name, password_hash, session_token,
    favorites, wallet_address, wallet_secret, created_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.email)
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.session_token)
        .bind(&favorites)
        .bind(wallet_address)
        .bind(wallet_secret)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Lost a registration race: another request created this email first
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(ValidationError::EmailTaken.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, email: &str, patch: UserPatch) -> Result<PatchOutcome, AppError> {
        let result = match &patch {
            UserPatch::SessionToken(token) => {
                sqlx::query("UPDATE users SET session_token = ? WHERE email = ?")
                    .bind(token)
                    .bind(email)
                    .execute(&self.pool)
                    .await?
            }
            UserPatch::Wallet(wallet) => {
                sqlx::query(
                    "UPDATE users SET wallet_address = ?, wallet_secret = ? WHERE email = ?",
                )
                    .bind(&wallet.address)
                    .bind(&wallet.secret)
                    .bind(email)
                    .execute(&self.pool)
                    .await?
            }
            UserPatch::AddFavorite(favorite) => {
                let snapshot = serde_json::to_string(favorite)
                    .map_err(|e| AppError::Internal(format!("Failed to encode favorite: {}", e)))?;

                // Append only when no favorite with the same id is present
                sqlx::query(
                    r#"
UPDATE users
SET favorites = json_insert(favorites, '$[#]', json(?))
WHERE email = ?
  AND NOT EXISTS (
    SELECT 1 FROM json_each(users.favorites)
    WHERE json_extract(json_each.value, '$.id') = ?
  )
                    "#,
                )
                .bind(&snapshot)
                .bind(email)
                .bind(&favorite.id)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() > 0 {
            return Ok(PatchOutcome::Applied);
        }
        if self.exists(email).await? {
            Ok(PatchOutcome::Unchanged)
        } else {
            Err(AppError::NotFound)
        }
    }
}
