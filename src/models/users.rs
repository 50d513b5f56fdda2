use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::crypto::{CredentialHasher, SessionIssuer};
use crate::error::{AppError, ValidationError};
use crate::ledger::{bounded, PaymentOracle};
use crate::models::pipeline::Pipeline;
use crate::models::{Favorite, FavoriteOutcome, PatchOutcome, User, UserPatch};

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,16}$").expect("Invalid email regex")
});

/// Keyed access to stored users.
///
/// Single-user lookups return `AppError::NotFound` on a miss; any other error
/// comes from the store itself.
#[async_trait]
pub trait UserDb: Send + Sync {
    async fn by_email(&self, email: &str) -> Result<User, AppError>;

    async fn create(&self, user: &mut User) -> Result<(), AppError>;

    async fn update(&self, email: &str, patch: UserPatch) -> Result<PatchOutcome, AppError>;
}

/// Account operations that combine storage with credentials, sessions and
/// the ledger. This is what request handlers hold.
#[async_trait]
pub trait UserService: UserDb {
    /// Validate and persist a new user, then issue its first session token.
    async fn register(&self, user: &mut User) -> Result<(), AppError>;

    /// Check an email/password pair. Returns the user with a fresh token;
    /// `NotFound` for an unknown email and `PasswordIncorrect` on mismatch.
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError>;

    async fn add_favorite(
        &self,
        user: &User,
        favorite: Favorite,
    ) -> Result<FavoriteOutcome, AppError>;

    /// Balance of the user's ledger account.
    async fn balance(&self, user: &User) -> Result<u64, AppError>;
}

/// Lower-case and trim. Idempotent.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Named checks run against a user before it reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStep {
    PasswordRequired,
    PasswordMinLength,
    HashPassword,
    NormalizeEmail,
    RequireEmail,
    EmailFormat,
    EmailAvailable,
    NormalizeName,
    RequireName,
}

/// Order matters: the email must be normalized before it is checked, and the
/// plaintext password is only cleared once it has been hashed.
pub const CREATE_STEPS: &[UserStep] = &[
    UserStep::PasswordRequired,
    UserStep::PasswordMinLength,
    UserStep::HashPassword,
    UserStep::NormalizeEmail,
    UserStep::RequireEmail,
    UserStep::EmailFormat,
    UserStep::EmailAvailable,
    UserStep::NormalizeName,
    UserStep::RequireName,
];

pub const LOOKUP_STEPS: &[UserStep] = &[UserStep::NormalizeEmail];

/// Validation layer in front of a raw `UserDb`.
pub struct UserValidator {
    inner: Arc<dyn UserDb>,
    hasher: Arc<CredentialHasher>,
}

impl UserValidator {
    pub fn new(inner: Arc<dyn UserDb>, hasher: Arc<CredentialHasher>) -> Self {
        Self { inner, hasher }
    }

    fn password_required(user: &mut User) -> Result<(), AppError> {
        if user.password.is_empty() {
            return Err(ValidationError::PasswordRequired.into());
        }
        Ok(())
    }

    fn password_min_length(user: &mut User) -> Result<(), AppError> {
        if !user.password.is_empty() && user.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort.into());
        }
        Ok(())
    }

    fn hash_password(&self, user: &mut User) -> Result<(), AppError> {
        if user.password.is_empty() {
            return Ok(());
        }
        user.password_hash = self.hasher.hash(&user.password)?;
        user.password.clear();
        Ok(())
    }

    fn normalize_email(user: &mut User) -> Result<(), AppError> {
        user.email = normalize_email(&user.email);
        Ok(())
    }

    fn require_email(user: &mut User) -> Result<(), AppError> {
        if user.email.is_empty() {
            return Err(ValidationError::EmailRequired.into());
        }
        Ok(())
    }

    fn email_format(user: &mut User) -> Result<(), AppError> {
        if !user.email.is_empty() && !EMAIL_RE.is_match(&user.email) {
            return Err(ValidationError::EmailInvalid.into());
        }
        Ok(())
    }

    /// Fast-path check only; the store's unique key is what actually
    /// prevents two accounts with one email.
    async fn email_available(&self, user: &mut User) -> Result<(), AppError> {
        match self.inner.by_email(&user.email).await {
            Err(AppError::NotFound) => Ok(()),
            Err(err) => Err(err),
            Ok(_) => Err(ValidationError::EmailTaken.into()),
        }
    }

    fn normalize_name(user: &mut User) -> Result<(), AppError> {
        user.name = user.name.trim().to_string();
        Ok(())
    }

    fn require_name(user: &mut User) -> Result<(), AppError> {
        if user.name.is_empty() {
            return Err(ValidationError::NameRequired.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Pipeline<User> for UserValidator {
    type Step = UserStep;

    async fn apply(&self, step: UserStep, user: &mut User) -> Result<(), AppError> {
        match step {
            UserStep::PasswordRequired => Self::password_required(user),
            UserStep::PasswordMinLength => Self::password_min_length(user),
            UserStep::HashPassword => self.hash_password(user),
            UserStep::NormalizeEmail => Self::normalize_email(user),
            UserStep::RequireEmail => Self::require_email(user),
            UserStep::EmailFormat => Self::email_format(user),
            UserStep::EmailAvailable => self.email_available(user).await,
            UserStep::NormalizeName => Self::normalize_name(user),
            UserStep::RequireName => Self::require_name(user),
        }
    }
}

#[async_trait]
impl UserDb for UserValidator {
    async fn by_email(&self, email: &str) -> Result<User, AppError> {
        let mut probe = User {
            email: email.to_string(),
            ..Default::default()
        };
        self.run(&mut probe, LOOKUP_STEPS).await?;
        self.inner.by_email(&probe.email).await
    }

    async fn create(&self, user: &mut User) -> Result<(), AppError> {
        self.run(user, CREATE_STEPS).await?;
        self.inner.create(user).await
    }

    async fn update(&self, email: &str, patch: UserPatch) -> Result<PatchOutcome, AppError> {
        self.inner.update(&normalize_email(email), patch).await
    }
}

/// The user domain service.
pub struct Users {
    db: Arc<dyn UserDb>,
    hasher: Arc<CredentialHasher>,
    sessions: Arc<SessionIssuer>,
    ledger: Arc<dyn PaymentOracle>,
    ledger_timeout: Duration,
}

impl Users {
    /// Wrap the raw store in the validation layer and compose the service.
    pub fn new(
        store: Arc<dyn UserDb>,
        hasher: Arc<CredentialHasher>,
        sessions: Arc<SessionIssuer>,
        ledger: Arc<dyn PaymentOracle>,
        ledger_timeout: Duration,
    ) -> Self {
        let db = Arc::new(UserValidator::new(store, hasher.clone()));
        Self {
            db,
            hasher,
            sessions,
            ledger,
            ledger_timeout,
        }
    }

    /// Issue a new token and persist it as the user's latest.
    async fn refresh_token(&self, user: &mut User) -> Result<(), AppError> {
        let token = self.sessions.issue(&user.email)?;
        self.db
            .update(&user.email, UserPatch::SessionToken(token.clone()))
            .await?;
        user.session_token = token;
        Ok(())
    }

    /// Open a ledger account for users that have none yet.
    ///
    /// Never fails: a ledger outage or a failed save leaves the user without a
    /// wallet, and the account is opened again on a later login.
    async fn ensure_wallet(&self, user: &mut User) {
        if user.wallet.is_some() {
            return;
        }

        let wallet = match bounded(self.ledger_timeout, self.ledger.open_account()).await {
            Ok(wallet) => wallet,
            Err(err) => {
                tracing::error!(
                    email = %user.email,
                    error = %err,
                    "Failed to open ledger account"
                );
                return;
            }
        };

        if let Err(err) = self
            .db
            .update(&user.email, UserPatch::Wallet(wallet.clone()))
            .await
        {
            // The ledger account exists but nothing points at it
            tracing::error!(
                email = %user.email,
                address = %wallet.address,
                error = %err,
                "Ledger account opened but not saved"
            );
            return;
        }
        tracing::info!(email = %user.email, address = %wallet.address, "Ledger account opened");
        user.wallet = Some(wallet);
    }
}

#[async_trait]
impl UserDb for Users {
    async fn by_email(&self, email: &str) -> Result<User, AppError> {
        self.db.by_email(email).await
    }

    async fn create(&self, user: &mut User) -> Result<(), AppError> {
        self.db.create(user).await
    }

    async fn update(&self, email: &str, patch: UserPatch) -> Result<PatchOutcome, AppError> {
        self.db.update(email, patch).await
    }
}

#[async_trait]
impl UserService for Users {
    async fn register(&self, user: &mut User) -> Result<(), AppError> {
        self.db.create(user).await?;
        tracing::info!(email = %user.email, "User registered");

        self.ensure_wallet(user).await;
        self.refresh_token(user).await.map_err(|err| {
            // The account exists; the client recovers by logging in
            tracing::error!(
                email = %user.email,
                error = %err,
                "User registered but no session token was stored"
            );
            err
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let mut user = self.db.by_email(email).await?;

        if !self.hasher.verify(password, &user.password_hash)? {
            return Err(AppError::PasswordIncorrect);
        }

        self.ensure_wallet(&mut user).await;
        self.refresh_token(&mut user).await?;
        Ok(user)
    }

    async fn add_favorite(
        &self,
        user: &User,
        favorite: Favorite,
    ) -> Result<FavoriteOutcome, AppError> {
        if user.has_favorite(&favorite.id) {
            return Ok(FavoriteOutcome::AlreadyFavorite);
        }

        match self.db.update(&user.email, UserPatch::AddFavorite(favorite)).await? {
            PatchOutcome::Applied => Ok(FavoriteOutcome::Added),
            PatchOutcome::Unchanged => Ok(FavoriteOutcome::AlreadyFavorite),
        }
    }

    async fn balance(&self, user: &User) -> Result<u64, AppError> {
        let wallet = user.wallet.as_ref().ok_or_else(|| {
            tracing::error!(
                email = %user.email,
                "Balance requested for a user without a ledger account"
            );
            AppError::UpstreamUnavailable("ledger account not opened yet".to_string())
        })?;

        bounded(self.ledger_timeout, self.ledger.balance(&wallet.address))
            .await
            .map_err(|err| {
                tracing::error!(email = %user.email, error = %err, "Balance lookup failed");
                AppError::from(err)
            })
    }
}
