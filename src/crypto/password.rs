use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::error::AppError;

/// One-way password hashing keyed with a server-side pepper.
///
/// The pepper is fed to Argon2id as its secret input, so a leaked hash is
/// useless without the process configuration.
pub struct CredentialHasher {
    pepper: Vec<u8>,
    params: Params,
}

impl CredentialHasher {
    pub fn new(pepper: &str) -> Result<Self, AppError> {
        Self::with_params(pepper, Params::default())
    }

    pub fn with_params(pepper: &str, params: Params) -> Result<Self, AppError> {
        if pepper.is_empty() {
            return Err(AppError::Config("password pepper must not be empty".to_string()));
        }
        let hasher = CredentialHasher {
            pepper: pepper.as_bytes().to_vec(),
            params,
        };
        // Surface a bad pepper/params combination at start-up rather than on first login
        hasher.argon2()?;
        Ok(hasher)
    }

    fn argon2(&self) -> Result<Argon2<'_>, AppError> {
        Argon2::new_with_secret(
            &self.pepper,
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|e| AppError::Config(format!("Invalid password hashing setup: {}", e)))
    }

    /// Hash a password with a fresh random salt, returning the PHC string.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored PHC string.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| AppError::Internal(format!("Invalid stored hash: {}", e)))?;

        match self.argon2()?.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!("Password verification failed: {}", e))),
        }
    }
}

/// Cheap Argon2 parameters so unit tests do not spend seconds per hash.
#[cfg(test)]
pub(crate) fn test_hasher() -> CredentialHasher {
    let params = Params::new(256, 1, 1, None).unwrap();
    CredentialHasher::with_params("test-pepper", params).unwrap()
}
