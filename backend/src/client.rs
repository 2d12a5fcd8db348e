use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::form::{SubmissionPayload, SubmissionTransport};
use crate::mailer::BatchReceipt;
use crate::models::{AccessGrant, Attachment, NotificationRequest, SubmissionReceipt};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Endpoint refused the request; `message` is its own wording.
    #[error("{message}")]
    Endpoint { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Browser-side view of the portal API.
#[derive(Clone)]
pub struct PortalClient {
    client: Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn resolve_pin(&self, pin: &str) -> Result<AccessGrant, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/access", self.base_url))
            .query(&[("pin", pin)])
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn submit_checklist(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, ClientError> {
        let form = build_form(payload)?;
        debug!(
            unit_record_id = %payload.unit_record_id,
            photos = payload.photos.len(),
            "posting checklist submission"
        );
        let response = self
            .client
            .post(format!("{}/api/submissions", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn send_notifications(
        &self,
        request: &NotificationRequest,
    ) -> Result<BatchReceipt, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/notifications", self.base_url))
            .json(request)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }
}

#[async_trait]
impl SubmissionTransport for PortalClient {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionReceipt, ClientError> {
        self.submit_checklist(payload).await
    }
}

fn build_form(payload: &SubmissionPayload) -> Result<multipart::Form, ClientError> {
    let mut form = multipart::Form::new();
    for (name, value) in payload.text_fields() {
        form = form.text(name, value);
    }
    for photo in &payload.photos {
        form = form.part("photos", file_part(photo)?);
    }
    Ok(form.part("signature", file_part(&payload.signature)?))
}

fn file_part(attachment: &Attachment) -> Result<multipart::Part, ClientError> {
    Ok(multipart::Part::bytes(attachment.bytes.clone())
        .file_name(attachment.filename.clone())
        .mime_str(&attachment.content_type)?)
}

async fn expect_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    Err(ClientError::Endpoint {
        status: status.as_u16(),
        message: endpoint_message(&raw)
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16())),
    })
}

/// Prefers `error`, then `airtable_error`, then a non-empty raw body.
fn endpoint_message(raw: &str) -> Option<String> {
    if let Ok(body) = serde_json::from_str::<Value>(raw) {
        for key in ["error", "airtable_error"] {
            match body.get(key) {
                Some(Value::String(message)) if !message.is_empty() => {
                    return Some(message.clone())
                }
                Some(Value::Null) | None => {}
                Some(other) => return Some(other.to_string()),
            }
        }
    }
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
