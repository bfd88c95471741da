use std::sync::Arc;

use mudey_core::config::{AppConfig, LoadOptions};
use mudey_db::repositories::{
    SqlCampaignLinkRepository, SqlCampaignRepository, SqlDeliveryLogRepository,
    SqlQuoteRequestRepository,
};
use mudey_db::{connect, migrations};
use mudey_notify::{FailoverEmailSender, NotificationDispatcher, SenderIdentity, UrlShortener};

use crate::commands::CommandResult;

/// Runs one dispatch sweep against the configured database. Operator
/// escape hatch for when the server's periodic sweep is not running.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "dispatch",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match crate::commands::runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "dispatch",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let dispatcher = NotificationDispatcher::new(
            Arc::new(SqlCampaignLinkRepository::new(pool.clone())),
            Arc::new(SqlQuoteRequestRepository::new(pool.clone())),
            Arc::new(SqlCampaignRepository::new(pool.clone())),
            Arc::new(SqlDeliveryLogRepository::new(pool.clone())),
            Arc::new(FailoverEmailSender::from_config(&config.email)),
            UrlShortener::from_config(&config.shortener),
            SenderIdentity {
                from_address: config.email.from_address.clone(),
                from_name: config.email.from_name.clone(),
                reply_to: config.email.reply_to.clone(),
            },
            config.shortener.portal_base_url.clone(),
            config.dispatch.clone(),
        );

        let summary = dispatcher.dispatch_pending().await;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "dispatch",
            format!(
                "sweep finished: {} sent, {} failed, {} batches",
                summary.sent, summary.failed, summary.batches
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("dispatch", error_class, message, exit_code)
        }
    }
}
