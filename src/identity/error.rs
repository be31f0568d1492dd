//! Typed error taxonomy for the identity core.
//!
//! Handlers translate these into HTTP responses. Login paths collapse
//! `NotFound` and `Auth` into one generic message so callers cannot probe for
//! known user IDs; recovery paths report the specific kind but never the
//! stored code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed or missing input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown user ID, email, or recovery challenge.
    #[error("not found")]
    NotFound,

    /// Bad credential or an invalid/expired federated token.
    #[error("authentication failed")]
    Auth,

    /// Duplicate email or a lost ID-allocation race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Recovery code past its time-to-live.
    #[error("one-time code expired")]
    Expired,

    /// Recovery code or bound email does not match the live challenge.
    #[error("one-time code or email mismatch")]
    Mismatch,

    /// Storage or collaborator failure; not surfaced verbatim to callers.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IdentityError {
    /// True for the two outcomes a login endpoint must not distinguish.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::NotFound | Self::Auth)
    }
}
