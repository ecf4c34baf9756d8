//! Storage abstraction: one trait, one adapter per backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::types::{
    DateRange, EmailRecordQuery, LearnerActivityProfile, NotificationPreference, RecordOutcome,
    RetentionEmailRecord, RetentionStage, RetentionStats, User,
};

/// Everything the retention job and the admin API read or write.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Backend name (sqlite, postgres, memory).
    fn name(&self) -> &str;

    /// Cheap connectivity check run before a job starts.
    async fn ping(&self) -> Result<()>;

    /// Users whose signup falls in `[start, end]` (inclusive), at most `limit`.
    async fn users_signed_up_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<User>>;

    /// Subset of `user_ids` that already have a record for `stage`,
    /// regardless of that attempt's outcome.
    async fn recorded_user_ids(
        &self,
        stage: RetentionStage,
        user_ids: &[String],
    ) -> Result<HashSet<String>>;

    /// Preference rows for the given users. Users without a row are absent.
    async fn notification_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, NotificationPreference>>;

    async fn activity_profile(&self, user_id: &str) -> Result<Option<LearnerActivityProfile>>;

    /// Number of modules in `completed` or `verified` status.
    async fn completed_module_count(&self, user_id: &str) -> Result<u32>;

    /// Append a record. A second write for the same `(user, stage)` yields
    /// `RecordOutcome::AlreadyRecorded` instead of an error.
    async fn insert_email_record(&self, record: &RetentionEmailRecord) -> Result<RecordOutcome>;

    /// Newest first.
    async fn list_email_records(&self, query: &EmailRecordQuery)
    -> Result<Vec<RetentionEmailRecord>>;

    /// Clear a record so the user becomes eligible for that stage again.
    /// Returns whether a record existed.
    async fn delete_email_record(&self, user_id: &str, stage: RetentionStage) -> Result<bool>;

    /// Per-stage attempt counts for records attempted within `range`.
    async fn retention_stats(&self, range: DateRange) -> Result<RetentionStats>;
}
