//! One-time recovery codes.
//!
//! Challenges live in a process-lifetime map keyed by user: at most one per
//! user, overwritten on re-issue, consumed on success, and discovered as
//! expired lazily on the next verification attempt. There is no background
//! sweep. The map mutex is held across the whole read/check/update/delete
//! sequence so a code can never be redeemed twice by concurrent callers.

use anyhow::Context;
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::email::{Delivery, EmailDelivery};
use super::error::IdentityError;
use super::password;
use super::store::IdentityStore;
use super::user::UserId;

/// Validity window of a recovery code. The boundary is inclusive: a
/// verification at exactly this age still succeeds.
pub const OTP_TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
struct OtpChallenge {
    code: String,
    bound_email: String,
    issued_at: Instant,
}

/// Outcome of issuing a code, as seen by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpIssued {
    /// Code handed to a real transport; nothing to surface.
    Sent,
    /// Development fallback: the code is returned for local inspection.
    Preview(String),
}

pub struct RecoveryOtpManager {
    store: Arc<dyn IdentityStore>,
    mailer: Arc<dyn EmailDelivery>,
    challenges: Mutex<HashMap<UserId, OtpChallenge>>,
    ttl: Duration,
}

impl RecoveryOtpManager {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, mailer: Arc<dyn EmailDelivery>) -> Self {
        Self {
            store,
            mailer,
            challenges: Mutex::new(HashMap::new()),
            ttl: OTP_TTL,
        }
    }

    /// Issue a fresh code for `user_id`, replacing any live challenge, and
    /// hand it to the email collaborator. `NotFound` when the user is unknown
    /// or the supplied email does not match the stored one; the two cases are
    /// deliberately indistinguishable.
    pub async fn issue(&self, user_id: &UserId, email: &str) -> Result<OtpIssued, IdentityError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        if user.email != email {
            return Err(IdentityError::NotFound);
        }

        let code = generate_code(&mut rand::thread_rng());
        {
            let mut challenges = self.challenges.lock().await;
            challenges.insert(
                *user_id,
                OtpChallenge {
                    code: code.clone(),
                    bound_email: email.to_string(),
                    issued_at: Instant::now(),
                },
            );
        }

        let delivery = self
            .mailer
            .send_recovery_code(email, &code)
            .context("failed to deliver recovery code")?;
        Ok(match delivery {
            Delivery::Sent => OtpIssued::Sent,
            Delivery::Logged => OtpIssued::Preview(code),
        })
    }

    /// Redeem a code and set a new password. `NotFound` without a live
    /// challenge, `Expired` past the TTL (challenge removed), `Mismatch` on a
    /// wrong code or email (challenge retained, retry allowed within the
    /// TTL). On success the password is updated and the challenge consumed;
    /// no session is established.
    pub async fn verify(
        &self,
        user_id: &UserId,
        code: &str,
        email: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.verify_at(Instant::now(), user_id, code, email, new_password)
            .await
    }

    async fn verify_at(
        &self,
        now: Instant,
        user_id: &UserId,
        code: &str,
        email: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let mut challenges = self.challenges.lock().await;
        let challenge = challenges.get(user_id).ok_or(IdentityError::NotFound)?;

        if now.saturating_duration_since(challenge.issued_at) > self.ttl {
            challenges.remove(user_id);
            return Err(IdentityError::Expired);
        }
        if challenge.code != code || challenge.bound_email != email {
            return Err(IdentityError::Mismatch);
        }

        let password_hash = password::hash_password(new_password)?;
        self.store
            .update_password_hash(user_id, &password_hash)
            .await?;
        challenges.remove(user_id);
        Ok(())
    }

    #[cfg(test)]
    async fn issued_at(&self, user_id: &UserId) -> Option<Instant> {
        let challenges = self.challenges.lock().await;
        challenges.get(user_id).map(|challenge| challenge.issued_at)
    }

    #[cfg(test)]
    async fn live_code(&self, user_id: &UserId) -> Option<String> {
        let challenges = self.challenges.lock().await;
        challenges.get(user_id).map(|challenge| challenge.code.clone())
    }
}

/// Uniformly random six-digit code; leading zeros allowed.
fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let value = rng.gen_range(0..1_000_000u32);
    format!("{value:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::email::LogMailer;
    use crate::identity::store::MemoryIdentityStore;
    use crate::identity::user::NewUser;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    async fn manager_with_user() -> (RecoveryOtpManager, UserId) {
        let store = Arc::new(MemoryIdentityStore::new());
        let user = store
            .create_user(NewUser {
                password_hash: password::hash_password("oldpassword1").expect("hash"),
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                phone: None,
            })
            .await
            .expect("create");
        let manager = RecoveryOtpManager::new(store, Arc::new(LogMailer));
        (manager, user.user_id)
    }

    fn preview(issued: OtpIssued) -> String {
        match issued {
            OtpIssued::Preview(code) => code,
            OtpIssued::Sent => panic!("expected dev preview from LogMailer"),
        }
    }

    #[test]
    fn codes_are_six_ascii_digits() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn codes_keep_leading_zeros() {
        struct ZeroRng;
        impl RngCore for ZeroRng {
            fn next_u32(&mut self) -> u32 {
                0
            }
            fn next_u64(&mut self) -> u64 {
                u64::from(self.next_u32())
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                dest.fill(0);
            }
            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
                dest.fill(0);
                Ok(())
            }
        }
        assert_eq!(generate_code(&mut ZeroRng), "000000");
    }

    #[tokio::test]
    async fn issue_rejects_unknown_user_and_wrong_email() {
        let (manager, user_id) = manager_with_user().await;

        let err = manager
            .issue(&UserId::from_suffix(99), "alice@example.com")
            .await
            .expect_err("unknown user");
        assert!(matches!(err, IdentityError::NotFound));

        let err = manager
            .issue(&user_id, "other@example.com")
            .await
            .expect_err("wrong email");
        assert!(matches!(err, IdentityError::NotFound));
    }

    #[tokio::test]
    async fn happy_path_consumes_challenge_and_updates_password() {
        let (manager, user_id) = manager_with_user().await;
        let code = preview(manager.issue(&user_id, "alice@example.com").await.expect("issue"));

        manager
            .verify(&user_id, &code, "alice@example.com", "longenough1")
            .await
            .expect("verify");

        let stored = manager
            .store
            .find_by_id(&user_id)
            .await
            .expect("find")
            .expect("present");
        assert!(password::verify_password("longenough1", &stored.password_hash));
        assert!(!password::verify_password("oldpassword1", &stored.password_hash));

        // The challenge is single use.
        let err = manager
            .verify(&user_id, &code, "alice@example.com", "longenough2")
            .await
            .expect_err("consumed");
        assert!(matches!(err, IdentityError::NotFound));
    }

    #[tokio::test]
    async fn mismatch_is_non_destructive() {
        let (manager, user_id) = manager_with_user().await;
        let code = preview(manager.issue(&user_id, "alice@example.com").await.expect("issue"));

        let wrong = if code == "000000" { "000001" } else { "000000" };
        let err = manager
            .verify(&user_id, wrong, "alice@example.com", "longenough1")
            .await
            .expect_err("wrong code");
        assert!(matches!(err, IdentityError::Mismatch));

        let err = manager
            .verify(&user_id, &code, "other@example.com", "longenough1")
            .await
            .expect_err("wrong email");
        assert!(matches!(err, IdentityError::Mismatch));

        // Retry with the correct pair still succeeds.
        manager
            .verify(&user_id, &code, "alice@example.com", "longenough1")
            .await
            .expect("verify after mismatch");
    }

    #[tokio::test]
    async fn expiry_boundary_is_inclusive() {
        let (manager, user_id) = manager_with_user().await;
        let code = preview(manager.issue(&user_id, "alice@example.com").await.expect("issue"));
        let issued_at = manager.issued_at(&user_id).await.expect("challenge");

        // Exactly at the TTL the code is still valid.
        manager
            .verify_at(
                issued_at + OTP_TTL,
                &user_id,
                &code,
                "alice@example.com",
                "longenough1",
            )
            .await
            .expect("verify at boundary");
    }

    #[tokio::test]
    async fn expired_challenge_is_removed() {
        let (manager, user_id) = manager_with_user().await;
        let code = preview(manager.issue(&user_id, "alice@example.com").await.expect("issue"));
        let issued_at = manager.issued_at(&user_id).await.expect("challenge");

        let err = manager
            .verify_at(
                issued_at + OTP_TTL + Duration::from_secs(1),
                &user_id,
                &code,
                "alice@example.com",
                "longenough1",
            )
            .await
            .expect_err("expired");
        assert!(matches!(err, IdentityError::Expired));

        // Expiry deletes the challenge; the next attempt sees nothing.
        let err = manager
            .verify(&user_id, &code, "alice@example.com", "longenough1")
            .await
            .expect_err("gone");
        assert!(matches!(err, IdentityError::NotFound));
    }

    #[tokio::test]
    async fn reissue_replaces_prior_challenge() {
        let (manager, user_id) = manager_with_user().await;
        let first = preview(manager.issue(&user_id, "alice@example.com").await.expect("issue"));
        let second = preview(manager.issue(&user_id, "alice@example.com").await.expect("issue"));
        let live = manager.live_code(&user_id).await.expect("challenge");
        assert_eq!(live, second);

        if first != second {
            let err = manager
                .verify(&user_id, &first, "alice@example.com", "longenough1")
                .await
                .expect_err("stale code");
            assert!(matches!(err, IdentityError::Mismatch));
        }

        manager
            .verify(&user_id, &second, "alice@example.com", "longenough1")
            .await
            .expect("verify");
    }
}
