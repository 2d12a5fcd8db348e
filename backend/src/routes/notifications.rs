use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;
use tracing::{error, info};

use crate::airtable::record_url;
use crate::emails::{display_type, EngineerReceipt, InternalAlert};
use crate::error::{AppError, AppResult};
use crate::mailer::{BatchReceipt, OutgoingEmail};
use crate::models::NotificationRequest;
use crate::state::AppState;

pub async fn dispatch_notifications(
    State(state): State<AppState>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> AppResult<Json<BatchReceipt>> {
    let Json(request) = payload.map_err(|err| AppError::bad_request(err.body_text()))?;
    let emails = build_emails(&state, &request)?;

    let serial_number = request.serial_number.as_deref().unwrap_or_default();
    match state.mailer.send_batch(emails).await {
        Ok(receipt) => {
            info!(
                serial_number = %serial_number,
                sent = receipt.data.len(),
                "maintenance notifications dispatched"
            );
            Ok(Json(receipt))
        }
        Err(err) => {
            error!(error = %err, serial_number = %serial_number, "notification dispatch failed");
            Err(AppError::from(err))
        }
    }
}

pub fn build_emails(
    state: &AppState,
    request: &NotificationRequest,
) -> AppResult<Vec<OutgoingEmail>> {
    let engineer_email = required(request.engineer_email.as_deref(), "engineerEmail")?;
    let serial_number = required(request.serial_number.as_deref(), "serialNumber")?;
    if state.config.internal_alert_recipients.is_empty() {
        return Err(AppError::internal(
            "internal alert recipients are not configured",
        ));
    }

    let display_type = display_type(request.report_type.as_deref());
    let engineer_name = request
        .engineer_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("Engineer");
    let technical = &request.technical_data;

    let receipt = EngineerReceipt {
        engineer_name,
        serial_number,
        display_type: &display_type,
        date: Utc::now().date_naive(),
        answers: &request.answers,
    };

    let record_link = match (
        state.config.airtable_base_id.as_deref(),
        technical.unit_record_id.as_deref(),
    ) {
        (Some(base_id), Some(record_id)) if !record_id.trim().is_empty() => Some(record_url(
            base_id,
            state.config.units_link_table(),
            record_id.trim(),
        )),
        _ => None,
    };

    let alert = InternalAlert {
        serial_number,
        display_type: &display_type,
        engineer_name,
        engineer_email,
        unit_record_id: technical.unit_record_id.as_deref(),
        checklist_template_id: technical.checklist_template_id.as_deref(),
        engineer_phone: technical.engineer_phone.as_deref(),
        location: technical.location_country.as_deref(),
        record_link,
        answers: &request.answers,
    };

    Ok(vec![
        OutgoingEmail {
            from: state.config.email_from.clone(),
            to: vec![engineer_email.to_string()],
            subject: receipt.subject(),
            html: receipt.render_html(),
        },
        OutgoingEmail {
            from: state.config.email_from.clone(),
            to: state.config.internal_alert_recipients.clone(),
            subject: alert.subject(),
            html: alert.render_html(),
        },
    ])
}

fn required<'a>(value: Option<&'a str>, name: &str) -> AppResult<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{name} is required")))
}
