//! Mail sender trait: the external delivery collaborator.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{OutboundEmail, SendReceipt};

#[async_trait]
pub trait MailSender: Send + Sync {
    /// Provider name (resend, smtp, log).
    fn name(&self) -> &str;

    /// Deliver one message. `Err` means the provider did not accept it.
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt>;
}
