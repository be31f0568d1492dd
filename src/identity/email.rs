//! Email delivery contract for recovery codes.
//!
//! The wire transport is an external collaborator; this crate only carries
//! the contract and a development sender that logs instead of sending. The
//! development sender reports `Delivery::Logged` so callers can surface the
//! code for local inspection, and wiring it up is an explicit configuration
//! choice that the server announces loudly at startup.

use anyhow::Result;
use tracing::info;

/// How a recovery code left the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to a real transport.
    Sent,
    /// Development fallback: logged locally, never transmitted.
    Logged,
}

pub trait EmailDelivery: Send + Sync {
    /// Deliver a recovery code or return the failure reason.
    fn send_recovery_code(&self, recipient: &str, code: &str) -> Result<Delivery>;
}

/// Development sender. Logs the code at info level and returns
/// [`Delivery::Logged`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

impl EmailDelivery for LogMailer {
    fn send_recovery_code(&self, recipient: &str, code: &str) -> Result<Delivery> {
        info!(recipient = %recipient, code = %code, "recovery code (dev mail fallback)");
        Ok(Delivery::Logged)
    }
}
