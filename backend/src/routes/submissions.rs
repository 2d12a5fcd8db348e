use std::collections::BTreeMap;

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Number, Value};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::models::{
    answer_key, fields::submission, parse_answer_key, Attachment, ChecklistTemplate,
    MaintenanceType, SubmissionReceipt,
};
use crate::records::{Fields, StoreError};
use crate::state::AppState;
use crate::units::get_template;

const DEFAULT_SIGNATURE_FILENAME: &str = "signature.png";

#[derive(Debug)]
pub enum SubmissionError {
    InvalidInput(String),
    Store(StoreError),
    Internal(String),
}

impl From<StoreError> for SubmissionError {
    fn from(value: StoreError) -> Self {
        SubmissionError::Store(value)
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            SubmissionError::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": message }),
            ),
            SubmissionError::Store(StoreError::Rejected { message, .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "airtable_error": message }),
            ),
            SubmissionError::Store(other) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": other.to_string() }),
            ),
            SubmissionError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": message }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Raw multipart submission before normalization.
#[derive(Debug, Default)]
pub struct SubmissionForm {
    pub unit_record_id: String,
    pub maintenance_type: String,
    pub checklist_template_id: String,
    pub maintained_by: String,
    pub engineer_name: String,
    pub engineer_phone: String,
    pub engineer_email: String,
    pub date_of_maintenance: String,
    pub location_lat: String,
    pub location_lng: String,
    pub location_town: String,
    pub location_what3words: String,
    pub comments: String,
    pub submission_id: String,
    /// Set by the server-rendered page so a plain browser post lands on the
    /// completion view instead of the JSON receipt.
    pub return_to: String,
    pub answers: BTreeMap<usize, String>,
    pub photos: Vec<Attachment>,
    pub signature: Option<Attachment>,
}

#[derive(Debug, Serialize)]
struct ChecklistDocument<'a> {
    maintenance_type: &'a str,
    template_id: &'a str,
    submitted_at: String,
    answers: Vec<ChecklistAnswer>,
    comments: &'a str,
}

#[derive(Debug, Serialize)]
struct ChecklistAnswer {
    key: String,
    question: Option<String>,
    answer: String,
}

pub async fn create_submission(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, SubmissionError> {
    let multipart = multipart.map_err(|err| {
        warn!(error = %err, "submission rejected: not a multipart body");
        SubmissionError::InvalidInput(format!("expected multipart form data: {err}"))
    })?;
    let form = read_submission_form(multipart).await?;

    if form.unit_record_id.is_empty() {
        return Err(SubmissionError::InvalidInput(
            "unit_record_id is required".into(),
        ));
    }
    if form.maintenance_type.is_empty() {
        return Err(SubmissionError::InvalidInput(
            "maintenance_type is required".into(),
        ));
    }
    let maintenance_type: MaintenanceType = form
        .maintenance_type
        .parse()
        .map_err(SubmissionError::InvalidInput)?;
    if form.checklist_template_id.is_empty() {
        return Err(SubmissionError::InvalidInput(
            "checklist_template_id is required".into(),
        ));
    }
    let signature = match &form.signature {
        Some(signature) if !signature.bytes.is_empty() => signature,
        _ => {
            warn!(unit_record_id = %form.unit_record_id, "submission rejected: missing signature");
            return Err(SubmissionError::InvalidInput(
                "signature is required".into(),
            ));
        }
    };

    let template = get_template(
        state.records.as_ref(),
        &state.config,
        &form.checklist_template_id,
    )
    .await
    .map_err(|err| {
        error!(error = %err, template_id = %form.checklist_template_id, "checklist template lookup failed");
        SubmissionError::from(err)
    })?
    .ok_or_else(|| {
        SubmissionError::InvalidInput(format!(
            "unknown checklist template: {}",
            form.checklist_template_id
        ))
    })?;

    let fingerprint = payload_fingerprint(&form);
    let fields = build_record_fields(&form, maintenance_type, &template, signature, Utc::now())
        .map_err(|err| SubmissionError::Internal(format!("failed to encode checklist: {err}")))?;

    match state
        .records
        .create_record(&state.config.airtable_submissions_table, fields)
        .await
    {
        Ok(record) => {
            info!(
                record_id = %record.id,
                unit_record_id = %form.unit_record_id,
                maintenance_type = %maintenance_type,
                template_id = %template.id,
                answers = form.answers.len(),
                photos = form.photos.len(),
                fingerprint = %fingerprint,
                "maintenance submission stored"
            );
            if let Some(target) = completion_redirect(&form.return_to) {
                return Ok(Redirect::to(target).into_response());
            }
            Ok(Json(SubmissionReceipt {
                success: true,
                record_id: Some(record.id),
            })
            .into_response())
        }
        Err(err) => {
            error!(
                error = %err,
                unit_record_id = %form.unit_record_id,
                fingerprint = %fingerprint,
                "maintenance submission rejected by record store"
            );
            Err(SubmissionError::Store(err))
        }
    }
}

/// Only same-site completion pages are accepted as redirect targets.
fn completion_redirect(return_to: &str) -> Option<&str> {
    let path = return_to.split('?').next().unwrap_or_default();
    let same_site = return_to.starts_with("/unit/")
        && path.ends_with("/complete")
        && !return_to.contains("//")
        && !return_to.contains('\\')
        && !return_to.chars().any(char::is_control);
    same_site.then_some(return_to)
}

async fn read_submission_form(mut multipart: Multipart) -> Result<SubmissionForm, SubmissionError> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        SubmissionError::InvalidInput(format!("invalid multipart data: {err}"))
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "photos" | "photos[]" => {
                let index = form.photos.len() + 1;
                let photo = read_attachment(field, &format!("photo-{index}")).await?;
                if photo.bytes.is_empty() {
                    continue;
                }
                form.photos.push(photo);
            }
            "signature" => {
                form.signature = Some(read_attachment(field, DEFAULT_SIGNATURE_FILENAME).await?);
            }
            _ => {
                let value = read_text(field, &name).await?;
                assign_text_field(&mut form, &name, value);
            }
        }
    }

    Ok(form)
}

fn assign_text_field(form: &mut SubmissionForm, name: &str, value: String) {
    let slot = match name {
        "unit_record_id" => &mut form.unit_record_id,
        "maintenance_type" => &mut form.maintenance_type,
        "checklist_template_id" => &mut form.checklist_template_id,
        "maintained_by" => &mut form.maintained_by,
        "engineer_name" => &mut form.engineer_name,
        "engineer_phone" => &mut form.engineer_phone,
        "engineer_email" => &mut form.engineer_email,
        "date_of_maintenance" => &mut form.date_of_maintenance,
        "location_lat" => &mut form.location_lat,
        "location_lng" => &mut form.location_lng,
        "location_town" => &mut form.location_town,
        "location_what3words" => &mut form.location_what3words,
        "comments" => &mut form.comments,
        "submission_id" => &mut form.submission_id,
        "return_to" => &mut form.return_to,
        other => {
            match parse_answer_key(other) {
                Some(position) => {
                    form.answers.insert(position, value);
                }
                None => warn!(field = %other, "ignoring unknown submission field"),
            }
            return;
        }
    };
    *slot = value.trim().to_string();
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String, SubmissionError> {
    field.text().await.map_err(|err| {
        error!(error = %err, field = %name, "failed to read submission field");
        SubmissionError::InvalidInput(format!("invalid value for {name}: {err}"))
    })
}

async fn read_attachment(
    field: Field<'_>,
    fallback_name: &str,
) -> Result<Attachment, SubmissionError> {
    let filename = field
        .file_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback_name)
        .to_string();
    let content_type = field
        .content_type()
        .map(str::to_string)
        .filter(|value| !value.is_empty() && value != "application/octet-stream")
        .unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
    let bytes = field.bytes().await.map_err(|err| {
        error!(error = %err, filename = %filename, "failed to read attachment bytes");
        SubmissionError::InvalidInput(format!("failed to read attachment {filename}: {err}"))
    })?;

    Ok(Attachment::new(filename, content_type, bytes.to_vec()))
}

/// Latitude/longitude as store numbers. Anything non-numeric is left out of the record.
pub fn parse_coordinate(raw: &str) -> Option<Number> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

pub fn build_record_fields(
    form: &SubmissionForm,
    maintenance_type: MaintenanceType,
    template: &ChecklistTemplate,
    signature: &Attachment,
    submitted_at: DateTime<Utc>,
) -> Result<Fields, serde_json::Error> {
    let document = ChecklistDocument {
        maintenance_type: maintenance_type.label(),
        template_id: &template.id,
        submitted_at: submitted_at.to_rfc3339(),
        answers: pair_answers(&form.answers, template),
        comments: &form.comments,
    };

    let mut fields = Fields::new();
    fields.insert(submission::UNIT.into(), json!([form.unit_record_id]));
    fields.insert(
        submission::MAINTENANCE_TYPE.into(),
        json!(maintenance_type.label()),
    );
    fields.insert(submission::CHECKLIST_TEMPLATE.into(), json!([template.id]));
    fields.insert(submission::MAINTAINED_BY.into(), json!(form.maintained_by));
    fields.insert(submission::ENGINEER_NAME.into(), json!(form.engineer_name));
    fields.insert(
        submission::DATE_OF_MAINTENANCE.into(),
        json!(form.date_of_maintenance),
    );
    if let Some(lat) = parse_coordinate(&form.location_lat) {
        fields.insert(submission::LOCATION_LAT.into(), Value::Number(lat));
    }
    if let Some(lng) = parse_coordinate(&form.location_lng) {
        fields.insert(submission::LOCATION_LNG.into(), Value::Number(lng));
    }
    fields.insert(submission::LOCATION_TOWN.into(), json!(form.location_town));
    fields.insert(
        submission::LOCATION_WHAT3WORDS.into(),
        json!(form.location_what3words),
    );
    for (key, value) in [
        (submission::ENGINEER_PHONE, &form.engineer_phone),
        (submission::ENGINEER_EMAIL, &form.engineer_email),
        (submission::SUBMISSION_ID, &form.submission_id),
    ] {
        if !value.is_empty() {
            fields.insert(key.into(), json!(value));
        }
    }
    fields.insert(
        submission::CHECKLIST_JSON.into(),
        Value::String(serde_json::to_string(&document)?),
    );
    fields.insert(submission::SIGNATURE.into(), json!([signature.encode()]));
    let photos: Vec<_> = form.photos.iter().map(Attachment::encode).collect();
    fields.insert(submission::PHOTOS.into(), json!(photos));

    Ok(fields)
}

/// Template positions first, in order, then any keys past the end of the template.
fn pair_answers(answers: &BTreeMap<usize, String>, template: &ChecklistTemplate) -> Vec<ChecklistAnswer> {
    let question_count = template.questions.len();
    let mut paired: Vec<ChecklistAnswer> = template
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| ChecklistAnswer {
            key: answer_key(index + 1),
            question: Some(question.clone()),
            answer: answers.get(&(index + 1)).cloned().unwrap_or_default(),
        })
        .collect();

    for (position, answer) in answers.range(question_count + 1..) {
        warn!(
            position,
            template_id = %template.id,
            "answer key beyond template question count"
        );
        paired.push(ChecklistAnswer {
            key: answer_key(*position),
            question: None,
            answer: answer.clone(),
        });
    }

    paired
}

fn payload_fingerprint(form: &SubmissionForm) -> String {
    let mut hasher = Sha256::new();
    for value in [
        &form.unit_record_id,
        &form.maintenance_type,
        &form.checklist_template_id,
        &form.maintained_by,
        &form.engineer_name,
        &form.date_of_maintenance,
        &form.comments,
    ] {
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    for (position, answer) in &form.answers {
        hasher.update(position.to_le_bytes());
        hasher.update(answer.as_bytes());
        hasher.update([0u8]);
    }
    for attachment in form.signature.iter().chain(form.photos.iter()) {
        hasher.update(&attachment.bytes);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    use super::*;

    fn template() -> ChecklistTemplate {
        ChecklistTemplate {
            id: "recTpl".into(),
            name: "Annual".into(),
            maintenance_type: Some(MaintenanceType::Annual),
            questions: vec!["Hull intact?".into(), "Seals replaced?".into()],
        }
    }

    fn form() -> SubmissionForm {
        let mut form = SubmissionForm {
            unit_record_id: "recUnit".into(),
            maintenance_type: "Annual".into(),
            checklist_template_id: "recTpl".into(),
            maintained_by: "Acme Marine".into(),
            engineer_name: "Sam".into(),
            date_of_maintenance: "2026-10-16".into(),
            location_lat: "51.5".into(),
            location_lng: "not-a-number".into(),
            comments: "All good".into(),
            ..SubmissionForm::default()
        };
        form.answers.insert(2, "No".into());
        form.answers.insert(1, "Yes".into());
        form.photos.push(Attachment::new("p1.jpg", "image/jpeg", vec![1, 2, 3]));
        form
    }

    #[test]
    fn pairs_answers_by_template_position() {
        let paired = pair_answers(&form().answers, &template());
        assert_eq!(paired.len(), 2);
        assert_eq!(paired[0].key, "q1");
        assert_eq!(paired[0].question.as_deref(), Some("Hull intact?"));
        assert_eq!(paired[0].answer, "Yes");
        assert_eq!(paired[1].key, "q2");
        assert_eq!(paired[1].answer, "No");
    }

    #[test]
    fn keeps_answers_beyond_template_without_question() {
        let mut answers = BTreeMap::new();
        answers.insert(4, "Extra".to_string());
        let paired = pair_answers(&answers, &template());
        assert_eq!(paired.len(), 3);
        assert_eq!(paired[0].answer, "");
        assert_eq!(paired[2].key, "q4");
        assert!(paired[2].question.is_none());
    }

    #[test]
    fn coerces_coordinates_without_failing() {
        assert!(parse_coordinate("51.5072").is_some());
        assert!(parse_coordinate("").is_none());
        assert!(parse_coordinate("abc").is_none());
        assert!(parse_coordinate("NaN").is_none());
    }

    #[test]
    fn builds_record_with_encoded_attachments_and_checklist_json() {
        let form = form();
        let signature = Attachment::new("signature.png", "image/png", vec![9, 9, 9, 9]);
        let submitted_at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        let fields = build_record_fields(
            &form,
            MaintenanceType::Annual,
            &template(),
            &signature,
            submitted_at,
        )
        .expect("fields");

        assert_eq!(fields["unit"], json!(["recUnit"]));
        assert_eq!(fields["checklist_template"], json!(["recTpl"]));
        assert_eq!(fields["location_lat"], json!(51.5));
        assert!(!fields.contains_key("location_lng"));
        assert!(!fields.contains_key("engineer_phone"));

        let signature_cells = fields["signature"].as_array().expect("signature array");
        assert_eq!(signature_cells.len(), 1);
        assert_eq!(signature_cells[0]["contentType"], "image/png");
        let decoded = STANDARD
            .decode(signature_cells[0]["data"].as_str().expect("data"))
            .expect("base64");
        assert_eq!(decoded, vec![9, 9, 9, 9]);

        let checklist: Value =
            serde_json::from_str(fields["checklist_json"].as_str().expect("json text"))
                .expect("checklist json");
        assert_eq!(checklist["maintenance_type"], "Annual");
        assert_eq!(checklist["template_id"], "recTpl");
        assert_eq!(checklist["submitted_at"], "2026-10-16T09:30:00+00:00");
        assert_eq!(checklist["answers"][1]["question"], "Seals replaced?");
        assert_eq!(checklist["comments"], "All good");
    }

    #[test]
    fn identical_payloads_share_a_fingerprint() {
        assert_eq!(payload_fingerprint(&form()), payload_fingerprint(&form()));
        let mut other = form();
        other.answers.insert(1, "No".into());
        assert_ne!(payload_fingerprint(&form()), payload_fingerprint(&other));
    }

    #[test]
    fn only_completion_pages_are_redirect_targets() {
        assert_eq!(
            completion_redirect("/unit/abc123/annual/complete?serial=SWI001"),
            Some("/unit/abc123/annual/complete?serial=SWI001")
        );
        assert_eq!(completion_redirect(""), None);
        assert_eq!(completion_redirect("https://evil.example/unit/x/annual/complete"), None);
        assert_eq!(completion_redirect("/unit//evil.example/complete"), None);
        assert_eq!(completion_redirect("/unit/abc123/annual"), None);
        assert_eq!(completion_redirect("/unit/abc\\123/annual/complete"), None);
    }
}
