use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, ValidationError};
use crate::models::{
    PatchOutcome, Product, ProductDb, Purchase, PurchaseDb, User, UserDb, UserPatch,
};

/// In-memory store with the same keying rules as the SQLite tables.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    products: RwLock<HashMap<String, Product>>,
    purchases: RwLock<Vec<Purchase>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::default();
        let catalog = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            products: RwLock::new(catalog),
            ..store
        }
    }

    pub async fn insert_product(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn purchase_count(&self) -> usize {
        self.purchases.read().await.len()
    }
}

#[async_trait]
impl UserDb for MemoryStore {
    async fn by_email(&self, email: &str) -> Result<User, AppError> {
        self.users
            .read()
            .await
            .get(email)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn create(&self, user: &mut User) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(ValidationError::EmailTaken.into());
        }
        // Never keep plaintext, whatever the caller handed over
        let stored = User {
            password: String::new(),
            ..user.clone()
        };
        users.insert(user.email.clone(), stored);
        Ok(())
    }

    async fn update(&self, email: &str, patch: UserPatch) -> Result<PatchOutcome, AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(email).ok_or(AppError::NotFound)?;

        match patch {
            UserPatch::SessionToken(token) => user.session_token = token,
            UserPatch::Wallet(wallet) => user.wallet = Some(wallet),
            UserPatch::AddFavorite(favorite) => {
                if user.has_favorite(&favorite.id) {
                    return Ok(PatchOutcome::Unchanged);
                }
                user.favorites.push(favorite);
            }
        }
        Ok(PatchOutcome::Applied)
    }
}

#[async_trait]
impl ProductDb for MemoryStore {
    async fn by_id(&self, id: &str) -> Result<Product, AppError> {
        self.products
            .read()
            .await
            .get(id.trim())
            .cloned()
            .ok_or(AppError::NotFound)
    }
}

#[async_trait]
impl PurchaseDb for MemoryStore {
    async fn by_email(&self, email: &str) -> Result<Vec<Purchase>, AppError> {
        let mut owned: Vec<Purchase> = self
            .purchases
            .read()
            .await
            .iter()
            .filter(|p| p.email == email)
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.created_at);
        Ok(owned)
    }

    async fn create(&self, purchase: &mut Purchase) -> Result<(), AppError> {
        let mut purchases = self.purchases.write().await;
        if purchases.iter().any(|p| p.id == purchase.id) {
            return Err(AppError::Internal(format!("duplicate purchase id {}", purchase.id)));
        }
        purchases.push(purchase.clone());
        Ok(())
    }
}
