use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use mudey_agent::HttpCompletionClient;
use mudey_notify::NotificationDispatcher;

use crate::pipeline::IntakePipeline;

/// Background sweep: every interval, retry deliverable campaign links and
/// reap intake sessions idle past the TTL.
///
/// The sweep is the safety net behind the immediate dispatch trigger; it
/// also picks up links left behind by crashes or provider outages.
pub fn spawn(
    dispatcher: Arc<NotificationDispatcher>,
    pipeline: Arc<IntakePipeline<HttpCompletionClient>>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let summary = dispatcher.dispatch_pending().await;
            let purged = pipeline.purge_idle_sessions();

            if summary.sent + summary.failed + purged > 0 {
                info!(
                    event_name = "system.sweep.finished",
                    correlation_id = "sweep",
                    sent = summary.sent,
                    failed = summary.failed,
                    batches = summary.batches,
                    sessions_purged = purged,
                    "periodic sweep finished"
                );
            }
        }
    })
}
