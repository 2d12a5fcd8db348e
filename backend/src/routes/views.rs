use std::fmt::Write as _;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, warn};
use url::Url;
use uuid::Uuid;

use crate::airtable::path_segment;
use crate::emails::escape_html;
use crate::form::CompletionRoute;
use crate::models::{ChecklistTemplate, MaintenanceType, Unit};
use crate::state::AppState;
use crate::units::{find_template, find_unit_by_token, resolve_pin, PinLookup, PIN_NOT_RECOGNISED};

const GENERIC_UNIT_LABEL: &str = "your SWIFT unit";

pub struct PageError {
    status: StatusCode,
    message: String,
}

impl PageError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "The maintenance portal is temporarily unavailable. Please try again."
                .into(),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let mut body = String::new();
        let _ = write!(body, "<p class=\"error\">{}</p>", escape_html(&self.message));
        body.push_str("<p><a href=\"/\">Enter a different code</a></p>");
        (self.status, Html(layout("SWIFT Maintenance", &body))).into_response()
    }
}

type PageResult = Result<Response, PageError>;

#[derive(Debug, Default, Deserialize)]
pub struct PinQuery {
    pub pin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionQuery {
    pub serial: Option<String>,
}

pub async fn landing_page() -> Html<String> {
    Html(render_landing(None))
}

pub async fn enter_pin(State(state): State<AppState>, Query(query): Query<PinQuery>) -> Response {
    let pin = query.pin.as_deref().map(str::trim).unwrap_or_default();
    if pin.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Html(render_landing(Some("Please enter the code on your unit."))),
        )
            .into_response();
    }

    match resolve_pin(state.records.as_ref(), &state.config, pin).await {
        Ok(PinLookup::Found(grant)) => {
            Redirect::to(&format!("/unit/{}", path_segment(&grant.public_token))).into_response()
        }
        Ok(PinLookup::NotRecognised) => (
            StatusCode::NOT_FOUND,
            Html(render_landing(Some(PIN_NOT_RECOGNISED))),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "access pin lookup failed");
            PageError::unavailable().into_response()
        }
    }
}

pub async fn unit_dashboard(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> PageResult {
    let unit = load_unit(&state, &token).await?;
    Ok(Html(render_dashboard(&unit, &token)).into_response())
}

pub async fn maintenance_page(
    State(state): State<AppState>,
    Path((token, maintenance_type)): Path<(String, String)>,
) -> PageResult {
    let maintenance_type = parse_type(&maintenance_type)?;
    let unit = load_unit(&state, &token).await?;

    if let Some(form_id) = unit.external_form_id(maintenance_type) {
        let embed_url = embed_form_url(&state.config.embed_form_base_url, form_id, &unit)
            .map_err(|err| {
                error!(error = %err, form_id = %form_id, "invalid embedded form url");
                PageError::unavailable()
            })?;
        return Ok(Html(render_embedded_form(&unit, maintenance_type, &embed_url)).into_response());
    }

    let template = find_template(state.records.as_ref(), &state.config, maintenance_type)
        .await
        .map_err(|err| {
            error!(error = %err, %maintenance_type, "checklist template lookup failed");
            PageError::unavailable()
        })?
        .ok_or_else(|| {
            warn!(%maintenance_type, "no checklist template configured");
            PageError::not_found(format!(
                "No {} maintenance checklist is available.",
                maintenance_type.label().to_lowercase()
            ))
        })?;

    let submission_id = Uuid::new_v4();
    Ok(Html(render_checklist_form(
        &unit,
        &token,
        maintenance_type,
        &template,
        submission_id,
    ))
    .into_response())
}

pub async fn completion_page(
    State(state): State<AppState>,
    Path((token, maintenance_type)): Path<(String, String)>,
    Query(query): Query<CompletionQuery>,
) -> PageResult {
    let maintenance_type = parse_type(&maintenance_type)?;

    let from_route = query
        .serial
        .map(|serial| serial.trim().to_string())
        .filter(|serial| !serial.is_empty());
    let serial = match from_route {
        Some(serial) => Some(serial),
        None => match find_unit_by_token(state.records.as_ref(), &state.config, &token).await {
            Ok(unit) => unit
                .map(|unit| unit.serial_number)
                .filter(|serial| !serial.is_empty()),
            Err(err) => {
                warn!(error = %err, "completion page could not look up unit serial");
                None
            }
        },
    };

    Ok(Html(render_completion(
        &token,
        maintenance_type,
        serial.as_deref().unwrap_or(GENERIC_UNIT_LABEL),
    ))
    .into_response())
}

fn parse_type(raw: &str) -> Result<MaintenanceType, PageError> {
    raw.parse()
        .map_err(|_| PageError::not_found("Unknown maintenance type."))
}

async fn load_unit(state: &AppState, token: &str) -> Result<Unit, PageError> {
    find_unit_by_token(state.records.as_ref(), &state.config, token)
        .await
        .map_err(|err| {
            error!(error = %err, "unit lookup failed");
            PageError::unavailable()
        })?
        .ok_or_else(|| PageError::not_found("Unit not found."))
}

pub fn embed_form_url(base: &str, form_id: &str, unit: &Unit) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path_segment(form_id)
    ))?;
    url.query_pairs_mut()
        .append_pair("serial_number", &unit.serial_number)
        .append_pair("unit_record_id", &unit.record_id);
    Ok(url)
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en-GB\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>{}</title></head><body><main>{}</main></body></html>",
        escape_html(title),
        body
    )
}

pub fn render_landing(error: Option<&str>) -> String {
    let mut body = String::from("<h1>SWIFT Maintenance</h1>");
    if let Some(error) = error {
        let _ = write!(body, "<p class=\"error\">{}</p>", escape_html(error));
    }
    body.push_str(
        "<form method=\"get\" action=\"/access\"><label for=\"pin\">Unit code</label><input id=\"pin\" name=\"pin\" autocomplete=\"off\" required><button type=\"submit\">Continue</button></form>",
    );
    layout("SWIFT Maintenance", &body)
}

pub fn render_dashboard(unit: &Unit, token: &str) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<h1>{}</h1><dl><dt>Company</dt><dd>{}</dd><dt>Model</dt><dd>{}</dd><dt>Last annual maintenance</dt><dd>{}</dd></dl><ul class=\"maintenance\">",
        escape_html(&unit.serial_number),
        escape_html(unit.company.as_deref().unwrap_or("-")),
        escape_html(unit.model.as_deref().unwrap_or("-")),
        escape_html(unit.last_annual_maintenance.as_deref().unwrap_or("-")),
    );
    for maintenance_type in MaintenanceType::ALL {
        let _ = write!(
            body,
            "<li><a href=\"/unit/{}/{}\">{} maintenance</a> <span>Due: {}</span></li>",
            path_segment(token),
            maintenance_type.slug(),
            maintenance_type.label(),
            escape_html(unit.due_date(maintenance_type).unwrap_or("-")),
        );
    }
    body.push_str("</ul>");
    layout(&unit.serial_number, &body)
}

pub fn render_checklist_form(
    unit: &Unit,
    token: &str,
    maintenance_type: MaintenanceType,
    template: &ChecklistTemplate,
    submission_id: Uuid,
) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<h1>{} {} maintenance</h1><form method=\"post\" action=\"/api/submissions\" enctype=\"multipart/form-data\" data-complete=\"/unit/{}/{}/complete\">",
        escape_html(&unit.serial_number),
        maintenance_type.label().to_lowercase(),
        path_segment(token),
        maintenance_type.slug(),
    );

    let submission_id = submission_id.to_string();
    let return_to = CompletionRoute {
        public_token: token.to_string(),
        maintenance_type,
        serial_number: unit.serial_number.clone(),
    }
    .path();
    for (name, value) in [
        ("return_to", return_to.as_str()),
        ("unit_record_id", unit.record_id.as_str()),
        ("maintenance_type", maintenance_type.label()),
        ("checklist_template_id", template.id.as_str()),
        ("submission_id", submission_id.as_str()),
        ("location_lat", ""),
        ("location_lng", ""),
        ("location_town", ""),
        ("location_what3words", ""),
    ] {
        let _ = write!(
            body,
            "<input type=\"hidden\" name=\"{name}\" value=\"{}\">",
            escape_html(value)
        );
    }

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    for (name, label, kind, required, value) in [
        ("maintained_by", "Maintained by", "text", true, ""),
        ("engineer_name", "Engineer name", "text", true, ""),
        ("engineer_email", "Engineer email", "email", true, ""),
        ("engineer_phone", "Engineer phone", "tel", false, ""),
        ("date_of_maintenance", "Date of maintenance", "date", true, today.as_str()),
    ] {
        let _ = write!(
            body,
            "<label for=\"{name}\">{label}</label><input id=\"{name}\" name=\"{name}\" type=\"{kind}\" value=\"{}\"{}>",
            escape_html(value),
            if required { " required" } else { "" }
        );
    }

    body.push_str("<ol class=\"checklist\">");
    for (key, question) in template.answer_keys() {
        let _ = write!(
            body,
            "<li><label for=\"{key}\">{}</label><textarea id=\"{key}\" name=\"{key}\" rows=\"2\"></textarea></li>",
            escape_html(question)
        );
    }
    body.push_str("</ol>");

    body.push_str(
        "<label for=\"comments\">Comments</label><textarea id=\"comments\" name=\"comments\" rows=\"4\"></textarea>\
         <label for=\"photos\">Photos</label><input id=\"photos\" name=\"photos\" type=\"file\" accept=\"image/*\" multiple>\
         <label for=\"signature\">Signature</label><input id=\"signature\" name=\"signature\" type=\"file\" accept=\"image/png\" required>\
         <button type=\"submit\">Submit</button></form>",
    );

    layout(&format!("{} checklist", unit.serial_number), &body)
}

pub fn render_embedded_form(unit: &Unit, maintenance_type: MaintenanceType, url: &Url) -> String {
    let body = format!(
        "<h1>{} {} maintenance</h1><iframe title=\"{} maintenance form\" src=\"{}\" width=\"100%\" height=\"1200\" frameborder=\"0\"></iframe>",
        escape_html(&unit.serial_number),
        maintenance_type.label().to_lowercase(),
        maintenance_type.label(),
        escape_html(url.as_str()),
    );
    layout(&format!("{} maintenance", unit.serial_number), &body)
}

pub fn render_completion(token: &str, maintenance_type: MaintenanceType, serial: &str) -> String {
    let body = format!(
        "<h1>{} maintenance complete</h1><p>Thank you. The {} maintenance report for <strong>{}</strong> has been submitted.</p><p><a href=\"/unit/{}\">Back to unit</a></p>",
        maintenance_type.label(),
        maintenance_type.label().to_lowercase(),
        escape_html(serial),
        path_segment(token),
    );
    layout("Maintenance complete", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Unit {
        Unit {
            record_id: "recUnit".into(),
            serial_number: "SWI001".into(),
            public_token: Some("abc123".into()),
            company: Some("Acme Marine".into()),
            model: Some("SWIFT 8".into()),
            last_annual_maintenance: None,
            annual_maintenance_due: Some("2027-01-01".into()),
            depth_maintenance_due: None,
            annual_form_id: None,
            depth_form_id: Some("2403".into()),
        }
    }

    #[test]
    fn renders_one_textarea_per_question_in_order() {
        let template = ChecklistTemplate {
            id: "recTpl".into(),
            name: "Annual".into(),
            maintenance_type: Some(MaintenanceType::Annual),
            questions: (1..=16).map(|n| format!("Question {n}")).collect(),
        };
        let html = render_checklist_form(
            &unit(),
            "abc123",
            MaintenanceType::Annual,
            &template,
            Uuid::new_v4(),
        );
        assert_eq!(html.matches("name=\"q").count(), 16);
        let q1 = html.find("name=\"q1\"").expect("q1");
        let q16 = html.find("name=\"q16\"").expect("q16");
        assert!(q1 < q16);
        assert!(html.contains("value=\"recTpl\""));
        assert!(html.contains(
            "name=\"return_to\" value=\"/unit/abc123/annual/complete?serial=SWI001\""
        ));
    }

    #[test]
    fn builds_embed_url_with_unit_context() {
        let url = embed_form_url("https://form.jotform.com/", "2403", &unit()).expect("url");
        assert_eq!(
            url.as_str(),
            "https://form.jotform.com/2403?serial_number=SWI001&unit_record_id=recUnit"
        );
    }

    #[test]
    fn completion_escapes_serial() {
        let html = render_completion("abc123", MaintenanceType::Annual, "<SWI>");
        assert!(html.contains("&lt;SWI&gt;"));
        assert!(html.contains("/unit/abc123"));
    }
}
