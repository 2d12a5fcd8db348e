use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::airtable::{exact_match_formula, path_segment};
use crate::utils::json::field_text;

pub type Fields = Map<String, Value>;

const AIRTABLE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn text(&self, field: &str) -> Option<String> {
        field_text(self.fields.get(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: String,
    pub value: String,
}

/// A point lookup: optional exact-match filter, a record cap and a field projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub filter: Option<FieldMatch>,
    pub max_records: Option<usize>,
    pub fields: Vec<String>,
}

impl RecordQuery {
    pub fn matching(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            filter: Some(FieldMatch {
                field: field.into(),
                value: value.into(),
            }),
            ..Self::default()
        }
    }

    pub fn max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store is not configured: {0} is missing")]
    NotConfigured(&'static str),
    #[error("record store rejected request with status {status}: {message}")]
    Rejected {
        status: u16,
        message: String,
        body: Value,
    },
    #[error("record store request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn find_records(&self, table: &str, query: &RecordQuery) -> StoreResult<Vec<Record>>;

    async fn get_record(&self, table: &str, record_id: &str) -> StoreResult<Option<Record>>;

    async fn create_record(&self, table: &str, fields: Fields) -> StoreResult<Record>;

    async fn update_record(&self, table: &str, record_id: &str, fields: Fields)
        -> StoreResult<Record>;
}

pub struct AirtableStore {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    base_id: Option<String>,
}

impl AirtableStore {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        api_key: Option<String>,
        base_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
            base_id,
        }
    }

    fn credentials(&self) -> StoreResult<(&str, &str)> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(StoreError::NotConfigured("AIRTABLE_API_KEY"))?;
        let base_id = self
            .base_id
            .as_deref()
            .ok_or(StoreError::NotConfigured("AIRTABLE_BASE_ID"))?;
        Ok((api_key, base_id))
    }

    fn table_url(&self, base_id: &str, table: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_url.trim_end_matches('/'),
            path_segment(base_id),
            path_segment(table)
        )
    }
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn find_records(&self, table: &str, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let (api_key, base_id) = self.credentials()?;
        let url = self.table_url(base_id, table);

        let mut base_params: Vec<(&str, String)> = Vec::new();
        if let Some(filter) = &query.filter {
            base_params.push((
                "filterByFormula",
                exact_match_formula(&filter.field, &filter.value),
            ));
        }
        if let Some(max) = query.max_records {
            base_params.push(("maxRecords", max.to_string()));
            base_params.push(("pageSize", max.min(AIRTABLE_PAGE_SIZE).to_string()));
        }
        for field in &query.fields {
            base_params.push(("fields[]", field.clone()));
        }

        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut params = base_params.clone();
            if let Some(offset) = &offset {
                params.push(("offset", offset.clone()));
            }

            debug!(%table, page_offset = ?offset, "listing records");
            let response = self
                .client
                .get(&url)
                .bearer_auth(api_key)
                .query(&params)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(rejection(response).await);
            }

            let page: ListResponse = response.json().await?;
            records.extend(page.records);

            let reached_cap = query
                .max_records
                .map(|max| records.len() >= max)
                .unwrap_or(false);
            match page.offset {
                Some(next) if !reached_cap => offset = Some(next),
                _ => break,
            }
        }

        if let Some(max) = query.max_records {
            records.truncate(max);
        }
        Ok(records)
    }

    async fn get_record(&self, table: &str, record_id: &str) -> StoreResult<Option<Record>> {
        let (api_key, base_id) = self.credentials()?;
        let url = format!(
            "{}/{}",
            self.table_url(base_id, table),
            path_segment(record_id)
        );

        let response = self.client.get(&url).bearer_auth(api_key).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn create_record(&self, table: &str, fields: Fields) -> StoreResult<Record> {
        let (api_key, base_id) = self.credentials()?;
        let url = self.table_url(base_id, table);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({ "fields": fields, "typecast": true }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> StoreResult<Record> {
        let (api_key, base_id) = self.credentials()?;
        let url = format!(
            "{}/{}",
            self.table_url(base_id, table),
            path_segment(record_id)
        );

        let response = self
            .client
            .patch(&url)
            .bearer_auth(api_key)
            .json(&json!({ "fields": fields, "typecast": true }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }
}

async fn rejection(response: Response) -> StoreError {
    let status = response.status();
    let raw = response.text().await.unwrap_or_default();
    let body: Value = serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
    let message = rejection_message(&body).unwrap_or_else(|| status.to_string());
    warn!(%status, body = %body, "airtable request rejected");
    StoreError::Rejected {
        status: status.as_u16(),
        message,
        body,
    }
}

fn rejection_message(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(kind)) => Some(kind.clone()),
        Some(Value::Object(error)) => error
            .get("message")
            .or_else(|| error.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => body
            .as_str()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string),
    }
}
