//! Durable user storage contract and the in-memory development store.
//!
//! The Postgres-backed store lives in [`crate::identity::pg`]. Both stores
//! uphold the same contract: allocation and row creation are a single atomic
//! unit, so concurrent signups can never observe the same identifier, and
//! email uniqueness is enforced at the same boundary.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::error::IdentityError;
use super::user::{NewUser, User, UserId};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Next identifier in sequence: one greater than the largest allocated
    /// suffix, `P0001` against an empty store. Callers that need the
    /// allocation to stick must go through [`IdentityStore::create_user`].
    async fn allocate_next_id(&self) -> Result<UserId, IdentityError>;

    /// Insert a fully-formed user. `Conflict` if the identifier or email is
    /// already taken; no row is created in that case.
    async fn insert_user(&self, user: User) -> Result<User, IdentityError>;

    /// Allocate an identifier and insert in one atomic unit. A lost
    /// ID-allocation race is retried once internally; duplicate emails
    /// surface as `Conflict`.
    async fn create_user(&self, profile: NewUser) -> Result<User, IdentityError>;

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>, IdentityError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError>;

    async fn update_password_hash(
        &self,
        user_id: &UserId,
        password_hash: &str,
    ) -> Result<(), IdentityError>;
}

/// Process-lifetime store for development mode and tests. One lock covers
/// allocation and insertion, which is the whole atomicity contract here.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: Mutex<HashMap<UserId, User>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(users: &HashMap<UserId, User>) -> UserId {
        users
            .keys()
            .max()
            .map_or_else(UserId::first, |max| max.next())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn allocate_next_id(&self) -> Result<UserId, IdentityError> {
        let users = self.users.lock().await;
        Ok(Self::next_id(&users))
    }

    async fn insert_user(&self, user: User) -> Result<User, IdentityError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user.user_id) {
            return Err(IdentityError::Conflict(format!(
                "user id {} already exists",
                user.user_id
            )));
        }
        if users.values().any(|existing| existing.email == user.email) {
            return Err(IdentityError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn create_user(&self, profile: NewUser) -> Result<User, IdentityError> {
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.email == profile.email) {
            return Err(IdentityError::Conflict(format!(
                "email {} already registered",
                profile.email
            )));
        }
        let user = profile.with_id(Self::next_id(&users));
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>, IdentityError> {
        let users = self.users.lock().await;
        Ok(users.get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn update_password_hash(
        &self,
        user_id: &UserId,
        password_hash: &str,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(user_id).ok_or(IdentityError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}
