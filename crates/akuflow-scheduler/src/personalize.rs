//! Personalization data aggregator: read-only context per candidate.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use akuflow_core::error::Result;
use akuflow_core::traits::RetentionStore;
use akuflow_core::types::{RetentionStage, User};

/// Activity within this many hours of signup does not count as "started".
const ACTIVITY_GRACE_HOURS: i64 = 1;

/// Stage-specific facts used to pick and fill a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageContext {
    Day1 {
        has_activity: bool,
    },
    Day3 {
        completed_modules: u32,
        current_streak: u32,
    },
    Day7 {
        completed_modules: u32,
        days_since_last_activity: i64,
    },
}

impl StageContext {
    pub fn stage(&self) -> RetentionStage {
        match self {
            Self::Day1 { .. } => RetentionStage::Day1,
            Self::Day3 { .. } => RetentionStage::Day3,
            Self::Day7 { .. } => RetentionStage::Day7,
        }
    }
}

/// An eligible user with their message context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub user: User,
    pub context: StageContext,
}

/// Gather context for one user. A missing activity profile means zero
/// activity, not an error.
pub async fn personalize(
    store: &dyn RetentionStore,
    stage: RetentionStage,
    user: User,
    now: DateTime<Utc>,
) -> Result<Candidate> {
    let profile = store.activity_profile(&user.id).await?;
    let last_activity = profile.as_ref().and_then(|p| p.last_activity_at);

    let context = match stage {
        RetentionStage::Day1 => StageContext::Day1 {
            has_activity: last_activity
                .is_some_and(|at| at > user.signed_up_at + Duration::hours(ACTIVITY_GRACE_HOURS)),
        },
        RetentionStage::Day3 => StageContext::Day3 {
            completed_modules: store.completed_module_count(&user.id).await?,
            current_streak: profile.as_ref().map_or(0, |p| p.current_streak),
        },
        RetentionStage::Day7 => StageContext::Day7 {
            completed_modules: store.completed_module_count(&user.id).await?,
            days_since_last_activity: last_activity
                .map(|at| (now - at).num_days().max(0))
                .unwrap_or_else(|| stage.days_since_signup()),
        },
    };

    Ok(Candidate { user, context })
}
