//! In-process session state.
//!
//! Sessions are process-lifetime and cleared on restart; recovery and login
//! state cannot be shared across instances without an external store, which
//! is out of scope at single-instance scale. Only a SHA-256 hash of the
//! session token is kept server-side; the raw value lives in the caller's
//! cookie.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::federated::PendingFederatedIdentity;
use super::user::UserId;

#[derive(Clone, Debug, Default)]
struct SessionState {
    user: Option<UserId>,
    pending: Option<PendingFederatedIdentity>,
}

#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<Vec<u8>, SessionState>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Random session token for the cookie. The raw value is only returned
    /// to the caller; lookups go through its hash.
    pub fn generate_token() -> Result<String> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session token")?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    /// Bind an authenticated user to the session. Any pending federated
    /// identity on the same session is discarded.
    pub async fn establish(&self, token: &str, user: UserId) {
        let mut sessions = self.sessions.lock().await;
        let state = sessions.entry(hash_token(token)).or_default();
        state.user = Some(user);
        state.pending = None;
    }

    pub async fn clear(&self, token: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&hash_token(token));
    }

    pub async fn authenticated_user(&self, token: &str) -> Option<UserId> {
        let sessions = self.sessions.lock().await;
        sessions.get(&hash_token(token)).and_then(|state| state.user)
    }

    /// Stash a federated identity awaiting profile completion. Lives only
    /// until the link completes or the session ends.
    pub async fn stash_pending(&self, token: &str, pending: PendingFederatedIdentity) {
        let mut sessions = self.sessions.lock().await;
        let state = sessions.entry(hash_token(token)).or_default();
        state.pending = Some(pending);
    }

    pub async fn pending(&self, token: &str) -> Option<PendingFederatedIdentity> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&hash_token(token))
            .and_then(|state| state.pending.clone())
    }

    pub async fn discard_pending(&self, token: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = sessions.get_mut(&hash_token(token)) {
            state.pending = None;
        }
    }
}

fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_identity() -> PendingFederatedIdentity {
        PendingFederatedIdentity {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            subject: "google-sub-1".to_string(),
        }
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let first = SessionManager::generate_token().expect("token");
        let second = SessionManager::generate_token().expect("token");
        assert_ne!(first, second);
        assert_eq!(Base64UrlUnpadded::decode_vec(&first).expect("decode").len(), 32);
    }

    #[tokio::test]
    async fn establish_and_clear_round_trip() {
        let sessions = SessionManager::new();
        let token = SessionManager::generate_token().expect("token");

        assert_eq!(sessions.authenticated_user(&token).await, None);
        sessions.establish(&token, UserId::first()).await;
        assert_eq!(sessions.authenticated_user(&token).await, Some(UserId::first()));

        sessions.clear(&token).await;
        assert_eq!(sessions.authenticated_user(&token).await, None);
    }

    #[tokio::test]
    async fn establish_discards_pending_identity() {
        let sessions = SessionManager::new();
        let token = SessionManager::generate_token().expect("token");

        sessions.stash_pending(&token, pending_identity()).await;
        assert!(sessions.pending(&token).await.is_some());

        sessions.establish(&token, UserId::first()).await;
        assert!(sessions.pending(&token).await.is_none());
        assert_eq!(sessions.authenticated_user(&token).await, Some(UserId::first()));
    }

    #[tokio::test]
    async fn pending_survives_reads_until_discarded() {
        let sessions = SessionManager::new();
        let token = SessionManager::generate_token().expect("token");

        sessions.stash_pending(&token, pending_identity()).await;
        assert!(sessions.pending(&token).await.is_some());
        assert!(sessions.pending(&token).await.is_some());

        sessions.discard_pending(&token).await;
        assert!(sessions.pending(&token).await.is_none());
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_token() {
        let sessions = SessionManager::new();
        let first = SessionManager::generate_token().expect("token");
        let second = SessionManager::generate_token().expect("token");

        sessions.establish(&first, UserId::first()).await;
        assert_eq!(sessions.authenticated_user(&second).await, None);
    }
}
