//! Shared application state and configuration for the API.

use std::sync::Arc;

use crate::identity::{
    CredentialAuthenticator, EmailDelivery, FederatedIdentityBroker, IdentityStore,
    RecoveryOtpManager, SessionManager,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    frontend_base_url: String,
    dev_mail_preview: bool,
}

impl AppConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            dev_mail_preview: false,
        }
    }

    /// Surface recovery codes in API responses when the mailer only logs
    /// them. Development only; the server warns at startup when set.
    #[must_use]
    pub fn with_dev_mail_preview(mut self, enabled: bool) -> Self {
        self.dev_mail_preview = enabled;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn dev_mail_preview(&self) -> bool {
        self.dev_mail_preview
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AppState {
    store: Arc<dyn IdentityStore>,
    sessions: SessionManager,
    otp: RecoveryOtpManager,
    authenticator: CredentialAuthenticator,
    broker: Option<FederatedIdentityBroker>,
    config: AppConfig,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        mailer: Arc<dyn EmailDelivery>,
        broker: Option<FederatedIdentityBroker>,
        config: AppConfig,
    ) -> Self {
        Self {
            otp: RecoveryOtpManager::new(Arc::clone(&store), mailer),
            authenticator: CredentialAuthenticator::new(Arc::clone(&store)),
            sessions: SessionManager::new(),
            store,
            broker,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn otp(&self) -> &RecoveryOtpManager {
        &self.otp
    }

    #[must_use]
    pub fn authenticator(&self) -> &CredentialAuthenticator {
        &self.authenticator
    }

    /// `None` when no federated client ID is configured; the federated
    /// endpoints answer 503 in that case.
    #[must_use]
    pub fn broker(&self) -> Option<&FederatedIdentityBroker> {
        self.broker.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn cookie_secure_follows_frontend_scheme() {
        let config = AppConfig::new("https://portal.healthoracle.dev".to_string());
        assert!(config.session_cookie_secure());

        let config = AppConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn dev_mail_preview_defaults_off() {
        let config = AppConfig::new("http://localhost:3000".to_string());
        assert!(!config.dev_mail_preview());
        assert!(config.with_dev_mail_preview(true).dev_mail_preview());
    }
}
