//! Eligibility selector: which signups a stage looks at on this run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use akuflow_core::config::RetentionConfig;
use akuflow_core::error::Result;
use akuflow_core::traits::RetentionStore;
use akuflow_core::types::{RetentionStage, User};

/// Signup-time window, both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignupWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SignupWindow {
    /// Window for `stage` at `now`: anchored `days_since_signup` days back,
    /// opening `lead_hours` before the anchor and `span_hours` wide. With the
    /// defaults (1h, 24h) that is `[anchor - 1h, anchor + 23h]`, which keeps
    /// an hourly trigger from missing users when a run starts late.
    pub fn for_stage(
        stage: RetentionStage,
        now: DateTime<Utc>,
        lead_hours: i64,
        span_hours: i64,
    ) -> Self {
        let anchor = now - Duration::days(stage.days_since_signup());
        let start = anchor - Duration::hours(lead_hours);
        Self {
            start,
            end: start + Duration::hours(span_hours.max(0)),
        }
    }

    pub fn from_config(stage: RetentionStage, now: DateTime<Utc>, config: &RetentionConfig) -> Self {
        Self::for_stage(stage, now, config.window_lead_hours, config.window_span_hours)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Users whose signup falls in `window`, at most `batch_size`, in storage
/// order. An empty window is not an error.
pub async fn select_candidates(
    store: &dyn RetentionStore,
    window: SignupWindow,
    batch_size: u32,
) -> Result<Vec<User>> {
    let users = store
        .users_signed_up_between(window.start, window.end, batch_size)
        .await?;
    // Adapters apply the same bounds; this guards against one that rounds.
    Ok(users
        .into_iter()
        .filter(|u| window.contains(u.signed_up_at))
        .take(batch_size as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use akuflow_db::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn user(id: &str, signed_up_at: DateTime<Utc>) -> User {
        User {
            id: id.into(),
            email: format!("{id}@example.com"),
            display_name: None,
            signed_up_at,
        }
    }

    #[test]
    fn test_default_windows_per_stage() {
        let config = RetentionConfig::default();
        for (stage, days) in [
            (RetentionStage::Day1, 1),
            (RetentionStage::Day3, 3),
            (RetentionStage::Day7, 7),
        ] {
            let w = SignupWindow::from_config(stage, now(), &config);
            let anchor = now() - Duration::days(days);
            assert_eq!(w.start, anchor - Duration::hours(1));
            assert_eq!(w.end, anchor + Duration::hours(23));
        }
    }

    #[tokio::test]
    async fn test_selects_only_inside_window() {
        let store = MemoryStore::new();
        let t = now();
        store.upsert_user(user("t-25h", t - Duration::hours(25))).unwrap();
        store.upsert_user(user("t-24h", t - Duration::hours(24))).unwrap();
        store.upsert_user(user("t-23h", t - Duration::hours(23))).unwrap();

        let window = SignupWindow {
            start: t - Duration::hours(25),
            end: t - Duration::hours(24),
        };
        let picked = select_candidates(&store, window, 100).await.unwrap();
        let ids: Vec<_> = picked.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["t-25h", "t-24h"]);
    }

    #[tokio::test]
    async fn test_outside_stage_window_never_selected() {
        let store = MemoryStore::new();
        let t = now();
        let config = RetentionConfig::default();
        let w = SignupWindow::from_config(RetentionStage::Day3, t, &config);
        store.upsert_user(user("before", w.start - Duration::seconds(1))).unwrap();
        store.upsert_user(user("after", w.end + Duration::seconds(1))).unwrap();
        store.upsert_user(user("inside", w.start + Duration::hours(2))).unwrap();

        let picked = select_candidates(&store, w, 100).await.unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "inside");
    }

    #[tokio::test]
    async fn test_batch_cap_and_empty_window() {
        let store = MemoryStore::new();
        let t = now();
        let w = SignupWindow::from_config(RetentionStage::Day1, t, &RetentionConfig::default());
        assert!(select_candidates(&store, w, 100).await.unwrap().is_empty());

        for i in 0..150 {
            store
                .upsert_user(user(&format!("u{i}"), w.start + Duration::minutes(i)))
                .unwrap();
        }
        assert_eq!(select_candidates(&store, w, 100).await.unwrap().len(), 100);
    }
}
