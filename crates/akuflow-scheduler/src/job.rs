//! Job orchestrator: runs every stage and aggregates the report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use akuflow_core::config::RetentionConfig;
use akuflow_core::error::Result;
use akuflow_core::traits::{MailSender, RetentionStore};
use akuflow_core::types::RetentionStage;

use crate::dispatch::{self, SendResult};
use crate::filter;
use crate::personalize::{self, Candidate};
use crate::window::{self, SignupWindow};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

/// Result of one job run. `errors` holds stage-level failures only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub success: bool,
    pub summary: JobSummary,
    pub results: Vec<SendResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl JobReport {
    fn from_parts(results: Vec<SendResult>, errors: Vec<String>) -> Self {
        let sent = results.iter().filter(|r| r.success).count();
        Self {
            success: true,
            summary: JobSummary {
                sent,
                failed: results.len() - sent,
                total: results.len(),
            },
            results,
            errors,
        }
    }
}

/// The retention-email job. Cheap to share behind an `Arc`.
pub struct RetentionJob {
    store: Arc<dyn RetentionStore>,
    sender: Arc<dyn MailSender>,
    config: RetentionConfig,
    /// Serializes runs inside this process.
    run_lock: Mutex<()>,
}

impl RetentionJob {
    pub fn new(
        store: Arc<dyn RetentionStore>,
        sender: Arc<dyn MailSender>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            store,
            sender,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RetentionStore> {
        &self.store
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run all stages against the current clock.
    pub async fn run_now(&self) -> Result<JobReport> {
        self.run(Utc::now()).await
    }

    /// Run Day1, Day3, Day7 in order. A stage that fails is logged,
    /// reported in `errors`, and skipped; the other stages still run.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<JobReport> {
        let _guard = self.run_lock.lock().await;
        tracing::info!(
            "🚀 Retention job started (store={}, mail={})",
            self.store.name(),
            self.sender.name()
        );
        if let Err(e) = self.store.ping().await {
            tracing::warn!("⚠️ Store {} did not answer ping: {e}", self.store.name());
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for stage in RetentionStage::ALL {
            match self.run_stage(stage, now).await {
                Ok((stage_results, stage_errors)) => {
                    results.extend(stage_results);
                    errors.extend(stage_errors);
                }
                Err(e) => {
                    tracing::error!("❌ [{stage}] stage failed: {e}");
                    errors.push(format!("{stage}: {e}"));
                }
            }
        }

        let report = JobReport::from_parts(results, errors);
        tracing::info!(
            "✅ Retention job finished: {} sent, {} failed, {} stage error(s)",
            report.summary.sent,
            report.summary.failed,
            report.errors.len()
        );
        Ok(report)
    }

    /// Returns the attempted sends plus per-user errors that stopped a
    /// send before it was attempted.
    async fn run_stage(
        &self,
        stage: RetentionStage,
        now: DateTime<Utc>,
    ) -> Result<(Vec<SendResult>, Vec<String>)> {
        let span = SignupWindow::from_config(stage, now, &self.config);
        let users = window::select_candidates(self.store.as_ref(), span, self.config.batch_size).await?;
        let found = users.len();
        let eligible = filter::filter_candidates(self.store.as_ref(), stage, users).await?;
        tracing::info!(
            "📋 [{stage}] window {} .. {}: {} signup(s), {} eligible",
            span.start.format("%Y-%m-%d %H:%M"),
            span.end.format("%Y-%m-%d %H:%M"),
            found,
            eligible.len()
        );

        let mut candidates: Vec<Candidate> = Vec::with_capacity(eligible.len());
        let mut errors = Vec::new();
        for user in eligible {
            let id = user.id.clone();
            match personalize::personalize(self.store.as_ref(), stage, user, now).await {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    // Nothing was sent, so nothing is recorded; the next run retries.
                    tracing::warn!("⚠️ [{stage}] could not load context for {id}: {e}");
                    errors.push(format!("{stage}: personalization failed for {id}: {e}"));
                }
            }
        }

        let results = dispatch::dispatch_stage(
            self.store.as_ref(),
            self.sender.as_ref(),
            candidates,
            &self.config.app_url,
        )
        .await;
        Ok((results, errors))
    }
}
