//! Federated (OAuth ID token) sign-in and account linking.
//!
//! Token verification checks signature, issuer, audience, and expiry against
//! the provider's published JWKS, with an in-process key cache that refreshes
//! when an unknown `kid` shows up (key rotation). Any verification failure is
//! a plain `Auth` error and is never retried automatically; the caller must
//! restart the external flow.

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::error::IdentityError;
use super::password;
use super::store::IdentityStore;
use super::user::{NewUser, User, UserId};

/// Identity asserted by the external token issuer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedClaims {
    pub email: String,
    pub name: String,
    pub subject: String,
}

/// Federated identity parked between token verification and completion of
/// the account-linking form. Bound to the caller's session, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFederatedIdentity {
    pub email: String,
    pub name: String,
    pub subject: String,
}

/// Entry point the federated attempt came from. Always supplied explicitly
/// by the caller; never inferred from request metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkIntent {
    Signup,
    Login,
}

/// Outcome of resolving verified claims against the identity store.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// A user already owns this email; authenticate directly.
    LoginSession(UserId),
    /// No user yet and the caller came from signup; profile completion
    /// required before a user is materialized.
    PendingLink(PendingFederatedIdentity),
    /// No user and the caller came from login; accounts are never silently
    /// created from a login entry point.
    Rejected,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str, audience: &str)
        -> Result<FederatedClaims, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

/// JWKS-backed verifier for RS/ES-signed ID tokens.
pub struct JwksTokenVerifier {
    issuer: String,
    jwks_url: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
}

impl JwksTokenVerifier {
    #[must_use]
    pub fn new(issuer: String, jwks_url: String) -> Self {
        Self {
            issuer,
            jwks_url,
            http: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Accepted `iss` values: the configured issuer plus its scheme-stripped
    /// or scheme-prefixed twin (Google emits both forms).
    fn issuer_variants(&self) -> Vec<String> {
        match self.issuer.strip_prefix("https://") {
            Some(bare) => vec![self.issuer.clone(), bare.to_string()],
            None => vec![self.issuer.clone(), format!("https://{}", self.issuer)],
        }
    }

    async fn key_for(&self, kid: &str) -> Result<Jwk, IdentityError> {
        {
            let keys = self.keys.read().await;
            if let Some(jwk) = keys.get(kid) {
                return Ok(jwk.clone());
            }
        }

        self.refresh_keys().await?;

        let keys = self.keys.read().await;
        keys.get(kid).cloned().ok_or_else(|| {
            warn!(kid = %kid, "no JWKS key for token kid");
            IdentityError::Auth
        })
    }

    async fn refresh_keys(&self) -> Result<(), IdentityError> {
        debug!(url = %self.jwks_url, "refreshing JWKS cache");
        let response = self.http.get(&self.jwks_url).send().await.map_err(|err| {
            warn!("JWKS fetch failed: {err}");
            IdentityError::Auth
        })?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "JWKS endpoint returned an error");
            return Err(IdentityError::Auth);
        }
        let jwks: JwkSet = response.json().await.map_err(|err| {
            warn!("JWKS response was not a key set: {err}");
            IdentityError::Auth
        })?;

        let mut fresh = HashMap::new();
        for jwk in jwks.keys {
            if let Some(kid) = jwk.common.key_id.clone() {
                fresh.insert(kid, jwk);
            }
        }
        let mut keys = self.keys.write().await;
        *keys = fresh;
        Ok(())
    }
}

const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

#[async_trait]
impl TokenVerifier for JwksTokenVerifier {
    async fn verify(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<FederatedClaims, IdentityError> {
        let header = decode_header(token).map_err(|err| {
            debug!("unparseable token header: {err}");
            IdentityError::Auth
        })?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            warn!(alg = ?header.alg, "rejected token algorithm");
            return Err(IdentityError::Auth);
        }
        let kid = header.kid.ok_or(IdentityError::Auth)?;
        let jwk = self.key_for(&kid).await?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|err| {
            warn!("invalid JWKS key material: {err}");
            IdentityError::Auth
        })?;

        // Pin validation to the exact algorithm from the header.
        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&self.issuer_variants());
        validation.set_audience(&[audience]);

        let data = decode::<IdTokenClaims>(token, &decoding_key, &validation).map_err(|err| {
            debug!("token validation failed: {err}");
            IdentityError::Auth
        })?;

        let email = data.claims.email.filter(|email| !email.is_empty()).ok_or_else(|| {
            warn!("federated token carried no email claim");
            IdentityError::Auth
        })?;
        Ok(FederatedClaims {
            email,
            name: data.claims.name.unwrap_or_else(|| "User".to_string()),
            subject: data.claims.sub,
        })
    }
}

/// Fixture verifier for tests and local development: accepts exactly the
/// tokens it was constructed with.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    audience: String,
    tokens: HashMap<String, FederatedClaims>,
}

impl StaticTokenVerifier {
    #[must_use]
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            tokens: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, claims: FederatedClaims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<FederatedClaims, IdentityError> {
        if audience != self.audience {
            return Err(IdentityError::Auth);
        }
        self.tokens.get(token).cloned().ok_or(IdentityError::Auth)
    }
}

/// Decides login vs. link-new-account for verified federated identities.
pub struct FederatedIdentityBroker {
    store: Arc<dyn IdentityStore>,
    verifier: Arc<dyn TokenVerifier>,
    audience: String,
}

impl FederatedIdentityBroker {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        verifier: Arc<dyn TokenVerifier>,
        audience: String,
    ) -> Self {
        Self {
            store,
            verifier,
            audience,
        }
    }

    pub async fn verify_token(&self, token: &str) -> Result<FederatedClaims, IdentityError> {
        self.verifier.verify(token, &self.audience).await
    }

    /// An existing user with the claimed email always resolves to a login,
    /// regardless of intent; a missing user resolves by entry point.
    pub async fn resolve(
        &self,
        claims: &FederatedClaims,
        intent: LinkIntent,
    ) -> Result<Resolution, IdentityError> {
        if let Some(user) = self.store.find_by_email(&claims.email).await? {
            return Ok(Resolution::LoginSession(user.user_id));
        }
        match intent {
            LinkIntent::Signup => Ok(Resolution::PendingLink(PendingFederatedIdentity {
                email: claims.email.clone(),
                name: claims.name.clone(),
                subject: claims.subject.clone(),
            })),
            LinkIntent::Login => Ok(Resolution::Rejected),
        }
    }

    /// Materialize a user for a pending federated identity. The account gets
    /// a random unusable password hash; it authenticates only via the
    /// federated path. `Conflict` when a concurrent path raced the email into
    /// existence first.
    pub async fn complete_link(
        &self,
        pending: &PendingFederatedIdentity,
        name: &str,
        phone: Option<String>,
    ) -> Result<User, IdentityError> {
        let profile = NewUser {
            password_hash: password::unusable_password_hash()?,
            name: name.to_string(),
            email: pending.email.clone(),
            phone,
        };
        self.store.create_user(profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::store::MemoryIdentityStore;

    fn claims(email: &str) -> FederatedClaims {
        FederatedClaims {
            email: email.to_string(),
            name: "Alice".to_string(),
            subject: "google-sub-1".to_string(),
        }
    }

    fn broker_with(store: Arc<MemoryIdentityStore>) -> FederatedIdentityBroker {
        let verifier = StaticTokenVerifier::new("client-id")
            .with_token("good-token", claims("alice@example.com"));
        FederatedIdentityBroker::new(store, Arc::new(verifier), "client-id".to_string())
    }

    #[test]
    fn intent_deserializes_lowercase_only() {
        let intent: LinkIntent = serde_json::from_str("\"signup\"").expect("parse");
        assert_eq!(intent, LinkIntent::Signup);
        let intent: LinkIntent = serde_json::from_str("\"login\"").expect("parse");
        assert_eq!(intent, LinkIntent::Login);
        assert!(serde_json::from_str::<LinkIntent>("\"referrer\"").is_err());
    }

    #[test]
    fn issuer_variants_cover_both_forms() {
        let verifier = JwksTokenVerifier::new(
            "https://accounts.google.com".to_string(),
            "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        );
        assert_eq!(
            verifier.issuer_variants(),
            vec![
                "https://accounts.google.com".to_string(),
                "accounts.google.com".to_string()
            ]
        );

        let verifier = JwksTokenVerifier::new(
            "accounts.google.com".to_string(),
            "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        );
        assert_eq!(
            verifier.issuer_variants(),
            vec![
                "accounts.google.com".to_string(),
                "https://accounts.google.com".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn jwks_verifier_rejects_garbage_tokens() {
        let verifier = JwksTokenVerifier::new(
            "https://accounts.google.com".to_string(),
            "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        );
        let err = verifier
            .verify("not-a-jwt", "client-id")
            .await
            .expect_err("garbage");
        assert!(matches!(err, IdentityError::Auth));
    }

    #[tokio::test]
    async fn static_verifier_checks_audience_and_token() {
        let verifier = StaticTokenVerifier::new("client-id")
            .with_token("good-token", claims("alice@example.com"));

        let verified = verifier.verify("good-token", "client-id").await.expect("verify");
        assert_eq!(verified.email, "alice@example.com");

        assert!(verifier.verify("good-token", "other-audience").await.is_err());
        assert!(verifier.verify("bad-token", "client-id").await.is_err());
    }

    #[tokio::test]
    async fn existing_email_resolves_to_login_for_any_intent() {
        let store = Arc::new(MemoryIdentityStore::new());
        let broker = broker_with(Arc::clone(&store));

        let pending = match broker
            .resolve(&claims("alice@example.com"), LinkIntent::Signup)
            .await
            .expect("resolve")
        {
            Resolution::PendingLink(pending) => pending,
            other => panic!("expected pending link, got {other:?}"),
        };
        let user = broker
            .complete_link(&pending, "Alice", None)
            .await
            .expect("link");

        for intent in [LinkIntent::Signup, LinkIntent::Login] {
            match broker
                .resolve(&claims("alice@example.com"), intent)
                .await
                .expect("resolve")
            {
                Resolution::LoginSession(user_id) => assert_eq!(user_id, user.user_id),
                other => panic!("expected login session, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn login_intent_without_user_is_rejected() {
        let store = Arc::new(MemoryIdentityStore::new());
        let broker = broker_with(store);
        let resolution = broker
            .resolve(&claims("new@example.com"), LinkIntent::Login)
            .await
            .expect("resolve");
        assert!(matches!(resolution, Resolution::Rejected));
    }

    #[tokio::test]
    async fn linked_account_cannot_use_password_login() {
        let store = Arc::new(MemoryIdentityStore::new());
        let broker = broker_with(Arc::clone(&store));
        let pending = PendingFederatedIdentity {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            subject: "google-sub-1".to_string(),
        };
        let user = broker
            .complete_link(&pending, "Alice A.", Some("+977 9812345678".to_string()))
            .await
            .expect("link");

        assert_eq!(user.name, "Alice A.");
        assert!(!crate::identity::password::verify_password(
            "anything",
            &user.password_hash
        ));
    }

    #[tokio::test]
    async fn double_link_conflicts_with_single_row() {
        let store = Arc::new(MemoryIdentityStore::new());
        let broker = broker_with(Arc::clone(&store));
        let pending = PendingFederatedIdentity {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            subject: "google-sub-1".to_string(),
        };

        let first = broker.complete_link(&pending, "Alice", None).await.expect("link");
        let err = broker
            .complete_link(&pending, "Alice", None)
            .await
            .expect_err("raced");
        assert!(matches!(err, IdentityError::Conflict(_)));

        // Exactly one row exists and it is the first one.
        let found = store
            .find_by_email("alice@example.com")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.user_id, first.user_id);
        assert_eq!(
            store.allocate_next_id().await.expect("allocate"),
            first.user_id.next()
        );
    }
}
