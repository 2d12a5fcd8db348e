use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentEmail {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub data: Vec<SentEmail>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email service is not configured: {0} is missing")]
    NotConfigured(&'static str),
    #[error("email service rejected batch with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("email service request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    /// Sends every email in one call. Either the whole batch is accepted or none of it is.
    async fn send_batch(&self, emails: Vec<OutgoingEmail>) -> Result<BatchReceipt, MailError>;
}

pub struct ResendMailer {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl ResendMailer {
    pub fn new(client: Client, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EmailSender for ResendMailer {
    async fn send_batch(&self, emails: Vec<OutgoingEmail>) -> Result<BatchReceipt, MailError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(MailError::NotConfigured("RESEND_API_KEY"))?;
        let url = format!("{}/emails/batch", self.api_url.trim_end_matches('/'));

        debug!(%url, count = emails.len(), "sending email batch");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&emails)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|body| {
                    body.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| {
                    if raw.trim().is_empty() {
                        status.to_string()
                    } else {
                        raw.clone()
                    }
                });
            warn!(%status, body = %raw, "resend batch rejected");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
