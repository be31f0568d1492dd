use crate::api::{self, AppConfig, AppState};
use crate::cli::actions::Action;
use crate::identity::{
    FederatedIdentityBroker, IdentityStore, JwksTokenVerifier, LogMailer, MemoryIdentityStore,
    PgIdentityStore,
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        frontend_url,
        google_client_id,
        google_issuer,
        google_jwks_url,
        dev_mail_preview,
    } = action;

    let store: Arc<dyn IdentityStore> = match dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(&dsn)
                .await
                .context("Failed to connect to database")?;
            let store = PgIdentityStore::new(pool);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            warn!("No DSN configured, user accounts are kept in memory and lost on restart");
            Arc::new(MemoryIdentityStore::new())
        }
    };

    let broker = google_client_id.map(|client_id| {
        FederatedIdentityBroker::new(
            Arc::clone(&store),
            Arc::new(JwksTokenVerifier::new(google_issuer, google_jwks_url)),
            client_id,
        )
    });
    if broker.is_none() {
        warn!("No Google client ID configured, federated sign-in endpoints answer 503");
    }

    if dev_mail_preview {
        warn!("Dev mail preview is enabled, recovery codes are returned in API responses");
    }

    let config = AppConfig::new(frontend_url).with_dev_mail_preview(dev_mail_preview);
    let state = Arc::new(AppState::new(store, Arc::new(LogMailer), broker, config));

    api::new(port, state).await?;

    Ok(())
}
