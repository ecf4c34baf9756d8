//! Dispatch & outcome recording.

use chrono::Utc;
use serde::Serialize;

use akuflow_core::traits::{MailSender, RetentionStore};
use akuflow_core::types::{RecordOutcome, RetentionEmailRecord, RetentionStage};

use crate::message;
use crate::personalize::Candidate;

/// Per-user outcome, as reported by the trigger endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub user_id: String,
    pub email: String,
    #[serde(rename = "type")]
    pub stage: RetentionStage,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resend_id: Option<String>,
}

/// Send each candidate's message and record the attempt, one user at a time.
///
/// Never fails as a whole: a send or record-write error stays on that
/// user's result and the loop moves on. Each record is stamped when its
/// send returns, not when the run started.
pub async fn dispatch_stage(
    store: &dyn RetentionStore,
    sender: &dyn MailSender,
    candidates: Vec<Candidate>,
    app_url: &str,
) -> Vec<SendResult> {
    let mut results = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let stage = candidate.context.stage();
        let email = message::render(&candidate, app_url);

        let (success, message_id, send_error) = match sender.send(&email).await {
            Ok(receipt) => {
                tracing::info!("📧 [{}] sent to {} via {}", stage, candidate.user.id, sender.name());
                (true, receipt.message_id, None)
            }
            Err(e) => {
                tracing::warn!("❌ [{}] send to {} failed: {e}", stage, candidate.user.id);
                (false, None, Some(e.to_string()))
            }
        };

        let record = RetentionEmailRecord {
            user_id: candidate.user.id.clone(),
            stage,
            attempted_at: Utc::now(),
            success,
            external_message_id: message_id.clone(),
            error: send_error.clone(),
        };

        let record_note = match store.insert_email_record(&record).await {
            Ok(RecordOutcome::Inserted) => None,
            Ok(RecordOutcome::AlreadyRecorded) => {
                tracing::warn!(
                    "⚠️ [{}] record for {} already existed (concurrent run?)",
                    stage,
                    candidate.user.id
                );
                Some("send record already existed for this stage".to_string())
            }
            Err(e) => {
                tracing::error!("❌ [{}] failed to record attempt for {}: {e}", stage, candidate.user.id);
                Some(format!("failed to record attempt: {e}"))
            }
        };

        let error = match (send_error, record_note) {
            (Some(s), Some(r)) => Some(format!("{s}; {r}")),
            (s, r) => s.or(r),
        };

        results.push(SendResult {
            user_id: candidate.user.id,
            email: candidate.user.email,
            stage,
            success,
            error,
            resend_id: message_id,
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalize::StageContext;
    use akuflow_core::error::{AkuflowError, Result};
    use akuflow_core::types::{OutboundEmail, SendReceipt, User};
    use akuflow_db::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Fails for listed recipients, succeeds for everyone else.
    struct ScriptedSender {
        fail_for: HashSet<String>,
        sent: Mutex<Vec<OutboundEmail>>,
    }

    impl ScriptedSender {
        fn failing(addresses: &[&str]) -> Self {
            Self {
                fail_for: addresses.iter().map(|a| a.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MailSender for ScriptedSender {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
            if self.fail_for.contains(&email.to) {
                return Err(AkuflowError::Mail("provider unavailable".into()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(email.clone());
            Ok(SendReceipt {
                message_id: Some(format!("msg-{}", sent.len())),
            })
        }
    }

    fn candidate(id: &str) -> Candidate {
        Candidate {
            user: User {
                id: id.into(),
                email: format!("{id}@example.com"),
                display_name: None,
                signed_up_at: Utc::now(),
            },
            context: StageContext::Day1 { has_activity: false },
        }
    }

    #[tokio::test]
    async fn test_failed_send_is_recorded_and_batch_continues() {
        let store = MemoryStore::new();
        let sender = ScriptedSender::failing(&["b@example.com"]);

        let results = dispatch_stage(
            &store,
            &sender,
            vec![candidate("a"), candidate("b"), candidate("c")],
            "https://app.test",
        )
        .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("provider unavailable"));
        assert!(results[2].success);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);

        let records = store.records().unwrap();
        assert_eq!(records.len(), 3);
        let failed: Vec<_> = records.iter().filter(|r| r.user_id == "b").collect();
        assert_eq!(failed.len(), 1);
        assert!(!failed[0].success);
        assert!(failed[0].external_message_id.is_none());
    }

    #[tokio::test]
    async fn test_existing_record_is_noted_not_fatal() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_email_record(&RetentionEmailRecord {
                user_id: "a".into(),
                stage: RetentionStage::Day1,
                attempted_at: now,
                success: true,
                external_message_id: None,
                error: None,
            })
            .await
            .unwrap();

        let sender = ScriptedSender::failing(&[]);
        let results = dispatch_stage(&store, &sender, vec![candidate("a")], "https://app.test").await;

        assert!(results[0].success);
        assert_eq!(results[0].resend_id.as_deref(), Some("msg-1"));
        assert!(results[0].error.as_deref().unwrap().contains("already existed"));
        assert_eq!(store.records().unwrap().len(), 1);
    }

    struct SlowSender;

    #[async_trait]
    impl MailSender for SlowSender {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send(&self, _email: &OutboundEmail) -> Result<SendReceipt> {
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            Ok(SendReceipt { message_id: None })
        }
    }

    #[tokio::test]
    async fn test_records_are_stamped_per_attempt() {
        let store = MemoryStore::new();
        let started = Utc::now();

        dispatch_stage(
            &store,
            &SlowSender,
            vec![candidate("a"), candidate("b")],
            "https://app.test",
        )
        .await;

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].attempted_at >= started + chrono::Duration::milliseconds(25));
        assert!(records[1].attempted_at >= records[0].attempted_at + chrono::Duration::milliseconds(25));
    }

    #[test]
    fn test_send_result_wire_shape() {
        let result = SendResult {
            user_id: "u1".into(),
            email: "u1@example.com".into(),
            stage: RetentionStage::Day3,
            success: true,
            error: None,
            resend_id: Some("re_1".into()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["type"], "day3");
        assert_eq!(json["resendId"], "re_1");
        assert!(json.get("error").is_none());
    }
}
