//! Password hashing and credential verification.
//!
//! Hashes are Argon2id with a per-password random salt. Verification parses
//! the stored PHC string and runs the constant-time comparison inside
//! `argon2`; a hash that fails to parse verifies as false rather than
//! erroring, so corrupt rows behave like a wrong password.

use anyhow::Context;
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;

use super::error::IdentityError;
use super::store::IdentityStore;
use super::user::UserId;

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored hash. Constant-time on the digest.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash of a random secret that is immediately discarded. Assigned to
/// federated-only accounts so password login can never succeed for them.
pub fn unusable_password_hash() -> Result<String, IdentityError> {
    let mut secret = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut secret)
        .context("failed to generate placeholder secret")?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(&secret, &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash placeholder secret: {err}"))?
        .to_string();
    Ok(hash)
}

/// Password login check against the identity store.
#[derive(Clone)]
pub struct CredentialAuthenticator {
    store: Arc<dyn IdentityStore>,
}

impl CredentialAuthenticator {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// True only for a known user with a matching password. Unknown IDs and
    /// wrong passwords are indistinguishable in the result.
    pub async fn verify(&self, user_id: &UserId, password: &str) -> Result<bool, IdentityError> {
        let Some(user) = self.store.find_by_id(user_id).await? else {
            return Ok(false);
        };
        Ok(verify_password(password, &user.password_hash))
    }
}
