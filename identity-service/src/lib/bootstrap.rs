//! Composition root: wires configuration into concrete adapters.

use std::sync::Arc;
use std::time::Duration;

use auth::TokenCodec;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::domain::identity::service::AuthService;
use crate::domain::identity::service::AuthSettings;
use crate::identity::ports::Mailer;
use crate::identity::ports::TokenStore;
use crate::outbound::notifications::webhook::LogMailer;
use crate::outbound::notifications::NotificationWorker;
use crate::outbound::notifications::QueuedNotificationDispatcher;
use crate::outbound::notifications::WebhookMailer;
use crate::outbound::providers::build_registry;
use crate::outbound::repositories::run_migrations;
use crate::outbound::repositories::PostgresCredentialStore;
use crate::outbound::repositories::PostgresTokenStore;

pub type IdentityService =
    AuthService<PostgresCredentialStore, PostgresTokenStore, QueuedNotificationDispatcher>;

/// Running service plus the handles the host process must shut down.
pub struct Application {
    pub service: Arc<IdentityService>,
    pub tokens: Arc<PostgresTokenStore>,
    pub worker: NotificationWorker,
}

pub async fn build(config: &Config) -> Result<Application, anyhow::Error> {
    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    tracing::info!(
        max_connections = config.database.max_connections,
        database = "postgresql",
        "Database connection pool created"
    );

    run_migrations(&pg_pool).await?;
    tracing::info!(database = "postgresql", "Database migrations completed");

    let mailer: Arc<dyn Mailer> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookMailer::new(url)?),
        None => {
            tracing::warn!("No notifications.webhook_url configured, notifications will only be logged");
            Arc::new(LogMailer)
        }
    };
    let (dispatcher, worker) =
        NotificationWorker::spawn(mailer, config.notifications.queue_capacity);

    let providers = build_registry(&config.providers)?;
    let codec = TokenCodec::new(config.tokens.keys());
    let settings = AuthSettings::new(config.app.base_url.clone(), &config.app.default_role);

    let credentials = Arc::new(PostgresCredentialStore::new(pg_pool.clone()));
    let tokens = Arc::new(PostgresTokenStore::new(pg_pool));

    let service = Arc::new(AuthService::new(
        credentials,
        Arc::clone(&tokens),
        Arc::new(dispatcher),
        providers,
        codec,
        settings,
    ));

    Ok(Application {
        service,
        tokens,
        worker,
    })
}

/// Periodically delete expired token records.
pub fn spawn_token_purge<TS: TokenStore>(tokens: Arc<TS>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match tokens.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Expired token records purged"),
                Err(e) => tracing::error!(error = %e, "Failed to purge expired token records"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use auth::TokenKind;

    use super::*;
    use crate::domain::identity::models::TokenRecord;
    use crate::outbound::repositories::InMemoryTokenStore;

    #[tokio::test]
    async fn test_purge_task_removes_expired_records() {
        let tokens = Arc::new(InMemoryTokenStore::new());
        tokens
            .save(TokenRecord {
                value: "stale".into(),
                kind: TokenKind::Refresh,
                email: "alice@example.com".into(),
                user_id: None,
                expires_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();

        let handle = spawn_token_purge(Arc::clone(&tokens), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(tokens.is_empty());
        handle.abort();
    }
}
