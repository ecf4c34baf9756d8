//! Log-only sender: nothing leaves the process.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use akuflow_core::error::Result;
use akuflow_core::traits::MailSender;
use akuflow_core::types::{OutboundEmail, SendReceipt};

#[derive(Default)]
pub struct LogSender {
    sent: AtomicU64,
}

impl LogSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MailSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        let tags: Vec<String> = email
            .tags
            .iter()
            .map(|t| format!("{}={}", t.name, t.value))
            .collect();
        tracing::info!(
            "📭 [dry-run] to={} subject={:?} tags=[{}]",
            email.to,
            email.subject,
            tags.join(",")
        );
        Ok(SendReceipt {
            message_id: Some(format!("log-{n}")),
        })
    }
}
