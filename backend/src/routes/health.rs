use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let config = &state.config;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "record_store_configured": config.airtable_api_key.is_some() && config.airtable_base_id.is_some(),
            "email_configured": config.resend_api_key.is_some() && !config.internal_alert_recipients.is_empty(),
        })),
    )
}
