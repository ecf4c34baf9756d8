//! SMTP sender (async lettre, STARTTLS relay).

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use akuflow_core::config::MailConfig;
use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::MailSender;
use akuflow_core::types::{OutboundEmail, SendReceipt};

pub struct SmtpSender {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    pub fn new(config: &MailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(AkuflowError::Config(
                "mail.provider = \"smtp\" requires smtp_host".into(),
            ));
        }
        let from: Mailbox = config
            .from_header()
            .parse()
            .map_err(|e| AkuflowError::Config(format!("Invalid from address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| AkuflowError::Mail(format!("SMTP relay: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(std::time::Duration::from_secs(config.timeout_secs.max(1))));
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            from,
            mailer: builder.build(),
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| AkuflowError::Mail(format!("Invalid to: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| AkuflowError::Mail(format!("Build email: {e}")))
    }
}

#[async_trait]
impl MailSender for SmtpSender {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let message = self.build_message(email)?;
        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|e| AkuflowError::Mail(format!("SMTP send: {e}")))?;

        // SMTP has no tag concept; keep them in our own logs.
        let tags: Vec<&str> = email.tags.iter().map(|t| t.value.as_str()).collect();
        tracing::info!("📤 Email sent to: {} [{}]", email.to, tags.join(","));
        Ok(SendReceipt {
            message_id: response.first_line().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailConfig {
        MailConfig {
            provider: "smtp".into(),
            smtp_host: "smtp.example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_host() {
        let mut cfg = config();
        cfg.smtp_host.clear();
        assert!(SmtpSender::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_rejects_invalid_recipient() {
        let sender = SmtpSender::new(&config()).unwrap();
        let email = OutboundEmail {
            to: "not-an-address".into(),
            subject: "s".into(),
            html: "<p>b</p>".into(),
            text: "b".into(),
            tags: vec![],
        };
        let err = sender.build_message(&email).unwrap_err();
        assert_eq!(err.kind(), "mail");
    }

    #[tokio::test]
    async fn test_builds_multipart_message() {
        let sender = SmtpSender::new(&config()).unwrap();
        let email = OutboundEmail {
            to: "Ada <ada@example.com>".into(),
            subject: "Great start!".into(),
            html: "<p>hello</p>".into(),
            text: "hello".into(),
            tags: vec![],
        };
        let message = sender.build_message(&email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Great start!"));
        assert!(raw.contains("multipart/alternative"));
    }
}
