#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Map, Value};
use swift_portal::config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES};
use swift_portal::form::signature::SignaturePad;
use swift_portal::mailer::{BatchReceipt, EmailSender, MailError, OutgoingEmail, SentEmail};
use swift_portal::records::{Fields, Record, RecordQuery, RecordStore, StoreError, StoreResult};
use swift_portal::routes;
use swift_portal::state::AppState;
use swift_portal::utils::json::field_text;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const UNITS: &str = "Units";
pub const CHECKLISTS: &str = "Checklists";
pub const SUBMISSIONS: &str = "Maintenance Records";
pub const INTERNAL_RECIPIENT: &str = "ops@swift.example";

/// A real signed PNG, drawn once and shared across tests.
pub static SIGNATURE_PNG: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut pad = SignaturePad::new(120, 40);
    pad.begin_stroke(5.0, 30.0);
    pad.line_to(60.0, 8.0);
    pad.line_to(115.0, 32.0);
    pad.end_stroke();
    pad.to_png().expect("encode signature png")
});

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    queries: Vec<(String, RecordQuery)>,
    created: Vec<(String, Fields)>,
    next_id: usize,
    write_rejection: Option<(u16, String)>,
}

/// In-memory record store with exact-match filtering, record caps and field projection.
#[derive(Default)]
pub struct FakeRecordStore {
    tables: Mutex<Tables>,
}

impl FakeRecordStore {
    pub async fn insert(&self, table: &str, id: &str, fields: Value) {
        let fields = fields.as_object().cloned().unwrap_or_default();
        let mut guard = self.tables.lock().await;
        guard
            .rows
            .entry(table.to_string())
            .or_default()
            .push(Record {
                id: id.to_string(),
                created_time: None,
                fields,
            });
    }

    pub async fn seed_unit(&self, id: &str, serial: &str, pin: &str, token: &str) {
        self.insert(
            UNITS,
            id,
            json!({
                "Serial Number": serial,
                "Access Pin": pin,
                "Public Token": token,
                "Company": "Acme Marine",
                "Model": "SWIFT 8",
                "Last Annual Maintenance": "2025-10-01",
                "Next Annual Maintenance Due": "2026-10-01",
                "Depth Maintenance Due": "2027-04-01",
            }),
        )
        .await;
    }

    pub async fn seed_checklist(&self, id: &str, maintenance_type: &str, questions: usize) {
        let questions: Vec<String> = (1..=questions).map(|n| format!("Check item {n}?")).collect();
        self.insert(
            CHECKLISTS,
            id,
            json!({
                "Name": format!("{maintenance_type} checklist"),
                "Type": maintenance_type,
                "Questions": questions.join("\n"),
            }),
        )
        .await;
    }

    pub async fn reject_writes(&self, status: u16, message: &str) {
        self.tables.lock().await.write_rejection = Some((status, message.to_string()));
    }

    pub async fn created(&self) -> Vec<(String, Fields)> {
        self.tables.lock().await.created.clone()
    }

    pub async fn queries(&self) -> Vec<(String, RecordQuery)> {
        self.tables.lock().await.queries.clone()
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

fn rejection(status: u16, message: &str) -> StoreError {
    StoreError::Rejected {
        status,
        message: message.to_string(),
        body: json!({ "error": { "type": "INVALID_REQUEST", "message": message } }),
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn find_records(&self, table: &str, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let mut guard = self.tables.lock().await;
        guard.queries.push((table.to_string(), query.clone()));

        let rows = guard.rows.get(table).cloned().unwrap_or_default();
        let mut matches: Vec<Record> = rows
            .into_iter()
            .filter(|record| match &query.filter {
                Some(filter) => {
                    field_text(record.fields.get(&filter.field)).unwrap_or_default()
                        == filter.value
                }
                None => true,
            })
            .collect();
        if let Some(max) = query.max_records {
            matches.truncate(max);
        }
        if !query.fields.is_empty() {
            for record in &mut matches {
                record.fields.retain(|name, _| query.fields.contains(name));
            }
        }
        Ok(matches)
    }

    async fn get_record(&self, table: &str, record_id: &str) -> StoreResult<Option<Record>> {
        let guard = self.tables.lock().await;
        Ok(guard
            .rows
            .get(table)
            .and_then(|rows| rows.iter().find(|record| record.id == record_id))
            .cloned())
    }

    async fn create_record(&self, table: &str, fields: Fields) -> StoreResult<Record> {
        let mut guard = self.tables.lock().await;
        guard.created.push((table.to_string(), fields.clone()));
        if let Some((status, message)) = &guard.write_rejection {
            return Err(rejection(*status, message));
        }

        guard.next_id += 1;
        let record = Record {
            id: format!("recCreated{}", guard.next_id),
            created_time: Some("2026-10-16T09:00:00.000Z".to_string()),
            fields,
        };
        guard
            .rows
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> StoreResult<Record> {
        let mut guard = self.tables.lock().await;
        if let Some((status, message)) = &guard.write_rejection {
            return Err(rejection(*status, message));
        }
        let record = guard
            .rows
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|record| record.id == record_id))
            .ok_or_else(|| rejection(404, "NOT_FOUND"))?;
        record.fields.extend(fields);
        Ok(record.clone())
    }
}

/// Records every batch it is handed; can be switched to reject.
#[derive(Default)]
pub struct FakeMailer {
    batches: Mutex<Vec<Vec<OutgoingEmail>>>,
    failure: Mutex<Option<String>>,
}

impl FakeMailer {
    pub async fn batches(&self) -> Vec<Vec<OutgoingEmail>> {
        self.batches.lock().await.clone()
    }

    pub async fn fail_with(&self, message: &str) {
        *self.failure.lock().await = Some(message.to_string());
    }
}

#[async_trait]
impl EmailSender for FakeMailer {
    async fn send_batch(&self, emails: Vec<OutgoingEmail>) -> Result<BatchReceipt, MailError> {
        let count = emails.len();
        self.batches.lock().await.push(emails);
        if let Some(message) = self.failure.lock().await.clone() {
            return Err(MailError::Rejected {
                status: 422,
                message,
            });
        }
        Ok(BatchReceipt {
            data: (1..=count)
                .map(|n| SentEmail {
                    id: format!("email-{n}"),
                })
                .collect(),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_allowed_origin: None,
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        airtable_api_url: "http://airtable.invalid/v0".to_string(),
        airtable_api_key: Some("key-test".to_string()),
        airtable_base_id: Some("appTestBase".to_string()),
        airtable_units_table: UNITS.to_string(),
        airtable_checklists_table: CHECKLISTS.to_string(),
        airtable_submissions_table: SUBMISSIONS.to_string(),
        airtable_units_table_id: Some("tblUnits".to_string()),
        resend_api_url: "http://resend.invalid".to_string(),
        resend_api_key: Some("re_test".to_string()),
        email_from: "SWIFT Maintenance <onboarding@resend.dev>".to_string(),
        internal_alert_recipients: vec![INTERNAL_RECIPIENT.to_string()],
        embed_form_base_url: "https://form.jotform.com".to_string(),
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    records: Arc<FakeRecordStore>,
    mailer: Arc<FakeMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let records = Arc::new(FakeRecordStore::default());
        let mailer = Arc::new(FakeMailer::default());
        let state = AppState::new(config, records.clone(), mailer.clone());
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            records,
            mailer,
        }
    }

    pub fn records(&self) -> Arc<FakeRecordStore> {
        self.records.clone()
    }

    pub fn mailer(&self) -> Arc<FakeMailer> {
        self.mailer.clone()
    }

    /// Serves the router on an ephemeral port and returns its base URL.
    pub async fn spawn(&self) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let address = listener.local_addr()?;
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(format!("http://{address}"))
    }

    pub async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn request(&self, method: Method, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.post_raw_json(path, body).await
    }

    /// Posts a body verbatim, keeping object key order as written.
    pub async fn post_raw_json(
        &self,
        path: &str,
        body: impl Into<Body>,
    ) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(body.into())?;
        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        parts: &[Part<'_>],
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    body.extend(*data);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(body: Body) -> Result<Value> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

pub async fn body_text(body: Body) -> Result<String> {
    let bytes = body_to_vec(body).await?;
    String::from_utf8(bytes).context("response body is not UTF-8")
}

pub fn fields_of(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
