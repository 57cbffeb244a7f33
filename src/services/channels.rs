use crate::config::SmtpConfig;
use crate::error::{Error, Result};
use crate::models::outreach::DeliveryMethod;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: Option<String>,
}

/// One outbound channel. `recipient` is channel specific: a chat id for
/// Telegram, an address for email. Channels without subjects ignore
/// `subject`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, text: &str) -> Result<SentMessage>;
}

#[derive(Clone)]
pub struct TelegramSender {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramSender {
    pub fn new(client: Client, bot_token: String) -> Self {
        Self {
            client,
            bot_token,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, recipient: &str, _subject: &str, text: &str) -> Result<SentMessage> {
        let chat_id: i64 = recipient
            .parse()
            .map_err(|_| Error::Channel(format!("Invalid Telegram chat id: {}", recipient)))?;
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
        if !status.is_success() || body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = body
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("no description");
            return Err(Error::Channel(format!(
                "Telegram API error {}: {}",
                status, description
            )));
        }

        let message_id = body
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(|id| id.as_i64())
            .map(|id| id.to_string());
        tracing::info!(chat_id, "Telegram message delivered");
        Ok(SentMessage { message_id })
    }
}

#[derive(Clone)]
pub struct EmailSender {
    smtp: Option<SmtpConfig>,
}

impl EmailSender {
    pub fn new(smtp: Option<SmtpConfig>) -> Self {
        Self { smtp }
    }
}

#[async_trait]
impl MessageSender for EmailSender {
    async fn send(&self, recipient: &str, subject: &str, text: &str) -> Result<SentMessage> {
        use lettre::{
            message::{header::ContentType, Mailbox},
            transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let smtp = self
            .smtp
            .as_ref()
            .ok_or_else(|| Error::Channel("Email channel is not configured".to_string()))?;

        let from: Mailbox = smtp
            .from
            .parse()
            .map_err(|e| Error::Channel(format!("Invalid from address: {}", e)))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| Error::Channel(format!("Invalid recipient address: {}", e)))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .map_err(|e| Error::Channel(format!("Build email: {}", e)))?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| Error::Channel(format!("SMTP relay: {}", e)))?
            .port(smtp.port);
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let response = transport
            .build()
            .send(email)
            .await
            .map_err(|e| Error::Channel(format!("SMTP send: {}", e)))?;

        tracing::info!(recipient, "Email delivered");
        let message_id = response.message().next().map(|line| line.to_string());
        Ok(SentMessage { message_id })
    }
}

/// Routes a send to the sender behind a delivery method.
#[derive(Clone)]
pub struct Channels {
    telegram: Arc<dyn MessageSender>,
    email: Arc<dyn MessageSender>,
}

impl Channels {
    pub fn new(telegram: Arc<dyn MessageSender>, email: Arc<dyn MessageSender>) -> Self {
        Self { telegram, email }
    }

    pub fn sender(&self, method: DeliveryMethod) -> &Arc<dyn MessageSender> {
        match method {
            DeliveryMethod::Telegram => &self.telegram,
            DeliveryMethod::Email => &self.email,
        }
    }

    pub async fn send(
        &self,
        method: DeliveryMethod,
        recipient: &str,
        subject: &str,
        text: &str,
    ) -> Result<SentMessage> {
        self.sender(method).send(recipient, subject, text).await
    }
}
