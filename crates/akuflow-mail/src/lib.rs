//! # Akuflow Mail
//!
//! Delivery adapters behind [`MailSender`], chosen by `mail.provider`:
//! - `resend` : transactional HTTP API, tags forwarded for provider-side filtering
//! - `smtp` : STARTTLS relay via lettre
//! - `log` : logs the message and returns a synthetic id (dry runs)

pub mod dry_run;
pub mod resend;
pub mod smtp;

use std::sync::Arc;

use akuflow_core::config::MailConfig;
use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::MailSender;

pub use dry_run::LogSender;
pub use resend::ResendSender;
pub use smtp::SmtpSender;

/// Build the sender named in config.
pub fn create_sender(config: &MailConfig) -> Result<Arc<dyn MailSender>> {
    match config.provider.as_str() {
        "resend" => Ok(Arc::new(ResendSender::new(config)?)),
        "smtp" => Ok(Arc::new(SmtpSender::new(config)?)),
        "log" => Ok(Arc::new(LogSender::new())),
        other => Err(AkuflowError::Config(format!(
            "unknown mail provider '{other}' (expected resend, smtp, or log)"
        ))),
    }
}
