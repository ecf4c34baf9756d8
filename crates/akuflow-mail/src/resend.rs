//! Resend transactional email API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use akuflow_core::config::MailConfig;
use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::MailSender;
use akuflow_core::types::{OutboundEmail, SendReceipt};

/// HTTP sender for the Resend `/emails` endpoint.
pub struct ResendSender {
    api_key: String,
    base_url: String,
    from: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    name: Option<String>,
}

impl ResendSender {
    pub fn new(config: &MailConfig) -> Result<Self> {
        if config.resend_api_key.is_empty() {
            return Err(AkuflowError::Config(
                "mail.provider = \"resend\" requires resend_api_key or RESEND_API_KEY".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AkuflowError::Mail(format!("HTTP client: {e}")))?;
        Ok(Self {
            api_key: config.resend_api_key.clone(),
            base_url: config.resend_base_url.trim_end_matches('/').to_string(),
            from: config.from_header(),
            client,
        })
    }

    fn payload(&self, email: &OutboundEmail) -> serde_json::Value {
        let tags: Vec<_> = email
            .tags
            .iter()
            .map(|t| json!({"name": t.name, "value": t.value}))
            .collect();
        json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
            "text": email.text,
            "tags": tags,
        })
    }
}

#[async_trait]
impl MailSender for ResendSender {
    fn name(&self) -> &str {
        "resend"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let url = format!("{}/emails", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| AkuflowError::Mail(format!("Resend request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let body: SendResponse = resp
                .json()
                .await
                .map_err(|e| AkuflowError::Mail(format!("Resend response: {e}")))?;
            tracing::debug!("✅ Resend accepted message for {}", email.to);
            return Ok(SendReceipt { message_id: body.id });
        }

        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.message.or(e.name))
            .unwrap_or(text);
        Err(AkuflowError::Mail(format!("Resend API error {status}: {detail}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use akuflow_core::types::EmailTag;
    use axum::{Json, Router, http::StatusCode, routing::post};

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "learner@example.com".into(),
            subject: "Ready to start your AI journey?".into(),
            html: "<p>hi</p>".into(),
            text: "hi".into(),
            tags: vec![
                EmailTag { name: "type".into(), value: "retention_day1".into() },
                EmailTag { name: "sequence".into(), value: "1".into() },
            ],
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn sender(base_url: String) -> ResendSender {
        ResendSender::new(&MailConfig {
            provider: "resend".into(),
            resend_api_key: "re_test".into(),
            resend_base_url: base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_payload_carries_tags() {
        let s = sender("http://localhost".into());
        let payload = s.payload(&email());
        assert_eq!(payload["to"][0], "learner@example.com");
        assert_eq!(payload["from"], "Akuflow <hello@akuflow.dev>");
        assert_eq!(payload["tags"][0]["name"], "type");
        assert_eq!(payload["tags"][1]["value"], "1");
    }

    #[tokio::test]
    async fn test_send_returns_provider_id() {
        let router = Router::new().route(
            "/emails",
            post(|headers: axum::http::HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers["authorization"], "Bearer re_test");
                assert_eq!(body["subject"], "Ready to start your AI journey?");
                Json(serde_json::json!({"id": "re-msg-42"}))
            }),
        );
        let base = serve(router).await;
        let receipt = sender(base).send(&email()).await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("re-msg-42"));
    }

    #[tokio::test]
    async fn test_send_surfaces_api_error() {
        let router = Router::new().route(
            "/emails",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({"name": "validation_error", "message": "Invalid `to` field"})),
                )
            }),
        );
        let base = serve(router).await;
        let err = sender(base).send(&email()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("422"), "{msg}");
        assert!(msg.contains("Invalid `to` field"), "{msg}");
    }
}
