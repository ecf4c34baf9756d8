//! In-process trigger loop, for deployments without an external cron.

use std::sync::Arc;

use crate::job::RetentionJob;

/// Run the job every `interval_secs` until the task is dropped.
/// The first tick fires immediately. Runs never overlap: the job holds its
/// own lock, so a slow run delays the next tick instead of racing it.
pub async fn spawn_retention_loop(job: Arc<RetentionJob>, interval_secs: u64) {
    let interval_secs = interval_secs.max(1);
    tracing::info!("⏰ Retention loop started (every {}s)", interval_secs);

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match job.run_now().await {
            Ok(report) => tracing::debug!(
                "📣 Retention tick: {}/{} sent",
                report.summary.sent,
                report.summary.total
            ),
            Err(e) => tracing::error!("❌ Retention tick failed: {e}"),
        }
    }
}
