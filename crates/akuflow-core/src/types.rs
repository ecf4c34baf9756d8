//! Domain model shared by the storage adapters, mail senders, and the
//! retention job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AkuflowError;

/// A point in the post-signup lifecycle that gets an automated email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetentionStage {
    #[serde(rename = "day1")]
    Day1,
    #[serde(rename = "day3")]
    Day3,
    #[serde(rename = "day7")]
    Day7,
}

impl RetentionStage {
    /// All stages, in the order the job runs them.
    pub const ALL: [RetentionStage; 3] = [Self::Day1, Self::Day3, Self::Day7];

    /// Days since signup this stage targets.
    pub fn days_since_signup(self) -> i64 {
        match self {
            Self::Day1 => 1,
            Self::Day3 => 3,
            Self::Day7 => 7,
        }
    }

    /// Stable identifier used in storage and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day1 => "day1",
            Self::Day3 => "day3",
            Self::Day7 => "day7",
        }
    }
}

impl fmt::Display for RetentionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionStage {
    type Err = AkuflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day1" | "day_1" | "1" => Ok(Self::Day1),
            "day3" | "day_3" | "3" => Ok(Self::Day3),
            "day7" | "day_7" | "7" => Ok(Self::Day7),
            other => Err(AkuflowError::InvalidInput(format!(
                "unknown retention stage '{other}'"
            ))),
        }
    }
}

/// A registered learner. Owned by the signup flow; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub signed_up_at: DateTime<Utc>,
}

impl User {
    /// Name to greet the user with: display name, else the email local part.
    pub fn greeting_name(&self) -> &str {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Per-user activity summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerActivityProfile {
    pub user_id: String,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub current_streak: u32,
}

/// Progress status of one module for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    NotStarted,
    InProgress,
    Completed,
    Verified,
}

impl ModuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Verified => "verified",
        }
    }

    /// Completed and verified modules both count toward progress.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::Verified)
    }
}

impl FromStr for ModuleStatus {
    type Err = AkuflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "verified" => Ok(Self::Verified),
            other => Err(AkuflowError::InvalidInput(format!(
                "unknown module status '{other}'"
            ))),
        }
    }
}

/// Per-user, per-module progress row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgressRecord {
    pub user_id: String,
    pub module_id: String,
    pub status: ModuleStatus,
}

/// Per-user notification opt-ins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: String,
    pub email_notifications: bool,
    pub learning_reminders: bool,
}

impl NotificationPreference {
    /// Retention emails need both opt-ins.
    pub fn allows_retention_email(&self) -> bool {
        self.email_notifications && self.learning_reminders
    }
}

/// Append-only log entry for one send attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionEmailRecord {
    pub user_id: String,
    pub stage: RetentionStage,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub external_message_id: Option<String>,
    pub error: Option<String>,
}

/// What happened when a record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// Another run already holds the `(user, stage)` slot.
    AlreadyRecorded,
}

/// Filter for listing records from the admin API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRecordQuery {
    pub stage: Option<RetentionStage>,
    pub user_id: Option<String>,
    pub limit: Option<u32>,
}

impl EmailRecordQuery {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    /// Effective limit, clamped to `[1, MAX_LIMIT]`.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> crate::Result<Self> {
        if end < start {
            return Err(AkuflowError::InvalidInput(format!(
                "range end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Attempt counts for a single stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl StageStats {
    pub fn add(&mut self, success: bool) {
        self.attempted += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Aggregate send outcomes over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionStats {
    pub range: DateRange,
    pub day1: StageStats,
    pub day3: StageStats,
    pub day7: StageStats,
}

impl RetentionStats {
    pub fn empty(range: DateRange) -> Self {
        Self {
            range,
            day1: StageStats::default(),
            day3: StageStats::default(),
            day7: StageStats::default(),
        }
    }

    pub fn stage_mut(&mut self, stage: RetentionStage) -> &mut StageStats {
        match stage {
            RetentionStage::Day1 => &mut self.day1,
            RetentionStage::Day3 => &mut self.day3,
            RetentionStage::Day7 => &mut self.day7,
        }
    }

    pub fn total(&self) -> StageStats {
        StageStats {
            attempted: self.day1.attempted + self.day3.attempted + self.day7.attempted,
            succeeded: self.day1.succeeded + self.day3.succeeded + self.day7.succeeded,
            failed: self.day1.failed + self.day3.failed + self.day7.failed,
        }
    }
}

/// Provider-side label attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTag {
    pub name: String,
    pub value: String,
}

/// A rendered message ready for a mail sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub tags: Vec<EmailTag>,
}

/// What a mail sender returns on accepted delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stage_round_trip_names() {
        for stage in RetentionStage::ALL {
            assert_eq!(stage.as_str().parse::<RetentionStage>().unwrap(), stage);
        }
        assert_eq!("DAY_3".parse::<RetentionStage>().unwrap(), RetentionStage::Day3);
        assert!("day2".parse::<RetentionStage>().is_err());
    }

    #[test]
    fn test_stage_serde_name() {
        let json = serde_json::to_string(&RetentionStage::Day7).unwrap();
        assert_eq!(json, "\"day7\"");
    }

    #[test]
    fn test_greeting_name_falls_back_to_local_part() {
        let mut user = User {
            id: "u1".into(),
            email: "ada@example.com".into(),
            display_name: Some("  ".into()),
            signed_up_at: Utc::now(),
        };
        assert_eq!(user.greeting_name(), "ada");
        user.display_name = Some("Ada Lovelace".into());
        assert_eq!(user.greeting_name(), "Ada Lovelace");
    }

    #[test]
    fn test_preferences_need_both_opt_ins() {
        let mut pref = NotificationPreference {
            user_id: "u1".into(),
            email_notifications: true,
            learning_reminders: true,
        };
        assert!(pref.allows_retention_email());
        pref.learning_reminders = false;
        assert!(!pref.allows_retention_email());
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(DateRange::new(a, b).is_err());
        let range = DateRange::new(b, a).unwrap();
        assert!(range.contains(a));
        assert!(range.contains(b));
    }

    #[test]
    fn test_record_query_limit_clamped() {
        let q = EmailRecordQuery { limit: Some(50_000), ..Default::default() };
        assert_eq!(q.effective_limit(), EmailRecordQuery::MAX_LIMIT);
        assert_eq!(EmailRecordQuery::default().effective_limit(), 100);
    }
}
