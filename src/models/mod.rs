pub mod pipeline;
pub mod products;
pub mod purchases;
pub mod users;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use pipeline::Pipeline;
pub use products::ProductDb;
pub use purchases::{purchase_service, PurchaseDb, PurchaseStep, PurchaseValidator};
pub use users::{normalize_email, UserDb, UserService, UserStep, UserValidator, Users};

/// A registered account.
///
/// `password` only ever holds the plaintext between request decoding and the
/// hashing step of the validation pipeline; persisted users have it empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_hash: String,
    /// Latest issued session token.
    pub session_token: String,
    pub favorites: Vec<Favorite>,
    pub wallet: Option<Wallet>,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn has_favorite(&self, product_id: &str) -> bool {
        self.favorites.iter().any(|f| f.id == product_id)
    }
}

/// Account on the external ledger.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    /// Source credential for transfers out of this account.
    pub secret: String,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Snapshot of a product taken when the user favorited it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: String,
    pub name: String,
    pub price: u64,
}

impl From<&Product> for Favorite {
    fn from(product: &Product) -> Self {
        Favorite {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
        }
    }
}

/// Catalog entry. Prices are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub quantity: u64,
}

/// Immutable record of a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub item: PurchaseItem,
}

impl Purchase {
    /// A purchase awaiting its timestamp and id from the pipeline.
    pub fn draft(email: impl Into<String>, item: PurchaseItem) -> Self {
        Purchase {
            id: String::new(),
            email: email.into(),
            created_at: DateTime::<Utc>::MIN_UTC,
            item,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: String,
    pub name: String,
    pub price: u64,
}

impl From<&Product> for PurchaseItem {
    fn from(product: &Product) -> Self {
        PurchaseItem {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
        }
    }
}

/// Partial update applied to a stored user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserPatch {
    SessionToken(String),
    AddFavorite(Favorite),
    Wallet(Wallet),
}

/// Whether a patch changed the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
    Added,
    AlreadyFavorite,
}
