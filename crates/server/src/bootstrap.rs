use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::info;

use mudey_agent::{HttpCompletionClient, PriceEstimator};
use mudey_core::audit::{AuditEvent, AuditSink};
use mudey_core::config::{AppConfig, ConfigError, LoadOptions};
use mudey_core::domain::session::InMemorySessionStore;
use mudey_core::guard::{InMemoryDuplicateGuard, InMemoryRateLimitGuard};
use mudey_core::pricing::PricingPolicy;
use mudey_db::repositories::{
    SqlCampaignLinkRepository, SqlCampaignRepository, SqlDeliveryLogRepository,
    SqlQuoteRequestRepository,
};
use mudey_db::{connect, migrations, DbPool};
use mudey_notify::{FailoverEmailSender, NotificationDispatcher, SenderIdentity, UrlShortener};
use mudey_whatsapp::events::{EventDispatcher, MessageHandler, StatusUpdateHandler};
use mudey_whatsapp::{ChannelRunner, HttpChannelSender, ReconnectPolicy};

use crate::pipeline::IntakePipeline;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sessions: Arc<InMemorySessionStore>,
    pub pipeline: Arc<IntakePipeline<HttpCompletionClient>>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub channel_runner: ChannelRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Audit sink that forwards every event to the tracing pipeline.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            identity = event.identity.as_deref().unwrap_or("unknown"),
            category = ?event.category,
            outcome = ?event.outcome,
            "audit event"
        );
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let requests = Arc::new(SqlQuoteRequestRepository::new(db_pool.clone()));
    let campaigns = Arc::new(SqlCampaignRepository::new(db_pool.clone()));
    let links = Arc::new(SqlCampaignLinkRepository::new(db_pool.clone()));
    let delivery_log = Arc::new(SqlDeliveryLogRepository::new(db_pool.clone()));

    let dispatcher = Arc::new(NotificationDispatcher::new(
        links.clone(),
        requests.clone(),
        campaigns.clone(),
        delivery_log,
        Arc::new(FailoverEmailSender::from_config(&config.email)),
        UrlShortener::from_config(&config.shortener),
        SenderIdentity {
            from_address: config.email.from_address.clone(),
            from_name: config.email.from_name.clone(),
            reply_to: config.email.reply_to.clone(),
        },
        config.shortener.portal_base_url.clone(),
        config.dispatch.clone(),
    ));

    let sessions = Arc::new(InMemorySessionStore::new());
    let estimator = HttpCompletionClient::from_config(&config.llm)
        .map(|client| PriceEstimator::new(client, PricingPolicy::default()));
    if estimator.is_none() {
        info!(
            event_name = "system.bootstrap.estimator_fallback_only",
            correlation_id = "bootstrap",
            "completion service not configured; deterministic fallback estimator only"
        );
    }

    let pipeline = Arc::new(IntakePipeline::new(
        sessions.clone(),
        Arc::new(InMemoryRateLimitGuard::new(
            config.intake.rate_limit_max_attempts,
            Duration::seconds(config.intake.rate_limit_window_secs),
        )),
        Arc::new(InMemoryDuplicateGuard::new()),
        estimator,
        PricingPolicy::default(),
        requests,
        campaigns,
        links,
        Arc::new(TracingAuditSink),
        Some(dispatcher.clone()),
        config.intake.clone(),
    ));

    let mut event_dispatcher = EventDispatcher::new();
    event_dispatcher.register(MessageHandler::new(pipeline.clone()));
    event_dispatcher.register(StatusUpdateHandler);

    let channel_runner = match HttpChannelSender::from_config(&config.channel) {
        Some(sender) => ChannelRunner::new(
            Arc::new(mudey_whatsapp::NoopChannelTransport),
            Arc::new(sender),
            event_dispatcher,
            ReconnectPolicy::default(),
        ),
        None => {
            info!(
                event_name = "system.bootstrap.channel_unconfigured",
                correlation_id = "bootstrap",
                "channel credentials missing; running with noop transport"
            );
            ChannelRunner::default()
        }
    };

    Ok(Application { config, db_pool, sessions, pipeline, dispatcher, channel_runner })
}

#[cfg(test)]
mod tests {
    use mudey_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_components() {
        let app = bootstrap(memory_options()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('quote_request', 'campaign', 'campaign_link', 'delivery_log')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected pipeline tables to exist after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose the pipeline tables");

        assert!(app.sessions.is_empty());
        // No channel credentials in tests: the runner must be the noop one.
        assert!(app.channel_runner.is_noop_transport());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_on_invalid_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn default_app_config_boots_against_memory_database() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        // A private in-memory database needs a single shared connection.
        config.database.max_connections = 1;

        let app = super::bootstrap_with_config(config).await.expect("bootstrap");
        assert_eq!(app.config.dispatch.batch_size, 50);
        app.db_pool.close().await;
    }
}
