use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::models::AccessGrant;
use crate::state::AppState;
use crate::units::{resolve_pin, PinLookup, PIN_NOT_RECOGNISED};

#[derive(Debug, Default, Deserialize)]
pub struct AccessRequest {
    #[serde(default)]
    pub pin: Option<String>,
}

pub async fn resolve_access_query(
    State(state): State<AppState>,
    Query(request): Query<AccessRequest>,
) -> AppResult<Json<AccessGrant>> {
    resolve(&state, request.pin.as_deref()).await
}

pub async fn resolve_access_json(
    State(state): State<AppState>,
    payload: Result<Json<AccessRequest>, JsonRejection>,
) -> AppResult<Json<AccessGrant>> {
    let Json(request) = payload.map_err(|err| AppError::bad_request(err.body_text()))?;
    resolve(&state, request.pin.as_deref()).await
}

async fn resolve(state: &AppState, pin: Option<&str>) -> AppResult<Json<AccessGrant>> {
    let pin = pin.unwrap_or_default().trim();
    if pin.is_empty() {
        return Err(AppError::bad_request("pin is required"));
    }

    match resolve_pin(state.records.as_ref(), &state.config, pin).await {
        Ok(PinLookup::Found(grant)) => {
            info!(
                serial_number = grant.serial_number.as_deref().unwrap_or_default(),
                "access pin resolved"
            );
            Ok(Json(grant))
        }
        Ok(PinLookup::NotRecognised) => Err(AppError::not_found(PIN_NOT_RECOGNISED)),
        Err(err) => {
            error!(error = %err, "access pin lookup failed");
            Err(AppError::from(err))
        }
    }
}
