//! Identity core: user storage, credentials, federated linking, recovery
//! codes, and sessions.
//!
//! Everything here returns structured outcomes from [`error::IdentityError`];
//! rendering and transport concerns live in [`crate::api`].

pub mod email;
pub mod error;
pub mod federated;
pub mod otp;
pub mod password;
pub mod pg;
pub mod session;
pub mod store;
pub mod user;

pub use email::{Delivery, EmailDelivery, LogMailer};
pub use error::IdentityError;
pub use federated::{
    FederatedClaims, FederatedIdentityBroker, JwksTokenVerifier, LinkIntent,
    PendingFederatedIdentity, Resolution, StaticTokenVerifier, TokenVerifier,
};
pub use otp::{OtpIssued, RecoveryOtpManager, OTP_TTL};
pub use password::CredentialAuthenticator;
pub use pg::PgIdentityStore;
pub use session::SessionManager;
pub use store::{IdentityStore, MemoryIdentityStore};
pub use user::{NewUser, User, UserId};
