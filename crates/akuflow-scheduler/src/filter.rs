//! Deduplication and preference filter.

use akuflow_core::error::Result;
use akuflow_core::traits::RetentionStore;
use akuflow_core::types::{RetentionStage, User};

/// Drop users who already have a record for `stage` (any outcome) and users
/// who turned off email notifications or learning reminders. Users with no
/// preference row keep the opt-in defaults.
pub async fn filter_candidates(
    store: &dyn RetentionStore,
    stage: RetentionStage,
    candidates: Vec<User>,
) -> Result<Vec<User>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }
    let ids: Vec<String> = candidates.iter().map(|u| u.id.clone()).collect();
    let recorded = store.recorded_user_ids(stage, &ids).await?;
    let prefs = store.notification_preferences(&ids).await?;

    let before = candidates.len();
    let eligible: Vec<User> = candidates
        .into_iter()
        .filter(|u| !recorded.contains(&u.id))
        .filter(|u| prefs.get(&u.id).is_none_or(|p| p.allows_retention_email()))
        .collect();

    tracing::debug!(
        "🧹 [{stage}] {} candidate(s) → {} eligible ({} already recorded)",
        before,
        eligible.len(),
        recorded.len()
    );
    Ok(eligible)
}
