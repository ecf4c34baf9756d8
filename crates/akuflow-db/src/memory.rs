//! In-memory adapter: dry runs, local development, and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::RetentionStore;
use akuflow_core::types::{
    DateRange, EmailRecordQuery, LearnerActivityProfile, ModuleProgressRecord,
    NotificationPreference, RecordOutcome, RetentionEmailRecord, RetentionStage, RetentionStats,
    User,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    activity: HashMap<String, LearnerActivityProfile>,
    progress: HashMap<(String, String), ModuleProgressRecord>,
    preferences: HashMap<String, NotificationPreference>,
    /// Insertion order is the storage order.
    records: Vec<RetentionEmailRecord>,
}

/// Process-local store with the same semantics as the SQL adapters.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| AkuflowError::Storage(format!("Lock: {e}")))
    }

    pub fn upsert_user(&self, user: User) -> Result<()> {
        let mut state = self.lock()?;
        match state.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => state.users.push(user),
        }
        Ok(())
    }

    pub fn upsert_activity(&self, profile: LearnerActivityProfile) -> Result<()> {
        self.lock()?.activity.insert(profile.user_id.clone(), profile);
        Ok(())
    }

    pub fn upsert_module_progress(&self, progress: ModuleProgressRecord) -> Result<()> {
        let key = (progress.user_id.clone(), progress.module_id.clone());
        self.lock()?.progress.insert(key, progress);
        Ok(())
    }

    pub fn upsert_preferences(&self, pref: NotificationPreference) -> Result<()> {
        self.lock()?.preferences.insert(pref.user_id.clone(), pref);
        Ok(())
    }

    /// Snapshot of every record, in write order.
    pub fn records(&self) -> Result<Vec<RetentionEmailRecord>> {
        Ok(self.lock()?.records.clone())
    }
}

#[async_trait]
impl RetentionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn users_signed_up_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .filter(|u| u.signed_up_at >= start && u.signed_up_at <= end)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn recorded_user_ids(
        &self,
        stage: RetentionStage,
        user_ids: &[String],
    ) -> Result<HashSet<String>> {
        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.stage == stage && wanted.contains(r.user_id.as_str()))
            .map(|r| r.user_id.clone())
            .collect())
    }

    async fn notification_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, NotificationPreference>> {
        let state = self.lock()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.preferences.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn activity_profile(&self, user_id: &str) -> Result<Option<LearnerActivityProfile>> {
        Ok(self.lock()?.activity.get(user_id).cloned())
    }

    async fn completed_module_count(&self, user_id: &str) -> Result<u32> {
        let state = self.lock()?;
        Ok(state
            .progress
            .values()
            .filter(|p| p.user_id == user_id && p.status.is_done())
            .count() as u32)
    }

    async fn insert_email_record(&self, record: &RetentionEmailRecord) -> Result<RecordOutcome> {
        let mut state = self.lock()?;
        let taken = state
            .records
            .iter()
            .any(|r| r.user_id == record.user_id && r.stage == record.stage);
        if taken {
            return Ok(RecordOutcome::AlreadyRecorded);
        }
        state.records.push(record.clone());
        Ok(RecordOutcome::Inserted)
    }

    async fn list_email_records(
        &self,
        query: &EmailRecordQuery,
    ) -> Result<Vec<RetentionEmailRecord>> {
        let state = self.lock()?;
        let mut matching: Vec<_> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| query.stage.is_none_or(|s| r.stage == s))
            .filter(|(_, r)| query.user_id.as_deref().is_none_or(|id| r.user_id == id))
            .collect();
        // Newest first; later writes win ties.
        matching.sort_by(|(ia, a), (ib, b)| b.attempted_at.cmp(&a.attempted_at).then(ib.cmp(ia)));
        Ok(matching
            .into_iter()
            .take(query.effective_limit() as usize)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn delete_email_record(&self, user_id: &str, stage: RetentionStage) -> Result<bool> {
        let mut state = self.lock()?;
        let before = state.records.len();
        state
            .records
            .retain(|r| !(r.user_id == user_id && r.stage == stage));
        Ok(state.records.len() < before)
    }

    async fn retention_stats(&self, range: DateRange) -> Result<RetentionStats> {
        let state = self.lock()?;
        let mut stats = RetentionStats::empty(range);
        for record in state.records.iter().filter(|r| range.contains(r.attempted_at)) {
            stats.stage_mut(record.stage).add(record.success);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user_id: &str, stage: RetentionStage, at: DateTime<Utc>) -> RetentionEmailRecord {
        RetentionEmailRecord {
            user_id: user_id.into(),
            stage,
            attempted_at: at,
            success: true,
            external_message_id: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_unique_per_user_and_stage() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert_eq!(
            store.insert_email_record(&record("a", RetentionStage::Day1, now)).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            store.insert_email_record(&record("a", RetentionStage::Day1, now)).await.unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(
            store.insert_email_record(&record("a", RetentionStage::Day3, now)).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_email_record(&record("a", RetentionStage::Day1, now - Duration::hours(2))).await.unwrap();
        store.insert_email_record(&record("b", RetentionStage::Day1, now)).await.unwrap();
        store.insert_email_record(&record("c", RetentionStage::Day3, now)).await.unwrap();

        let day1 = store
            .list_email_records(&EmailRecordQuery {
                stage: Some(RetentionStage::Day1),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = day1.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let only_c = store
            .list_email_records(&EmailRecordQuery {
                user_id: Some("c".into()),
                limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_c.len(), 1);
    }
}
