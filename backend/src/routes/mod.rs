use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{error::method_not_allowed, state::AppState};

pub mod access;
pub mod health;
pub mod notifications;
pub mod submissions;
pub mod views;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %trimmed, "ignoring invalid CORS allowed origin");
                        None
                    }
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
    };
    let body_limit = state.config.max_upload_bytes;

    let api_routes = Router::new()
        .route(
            "/access",
            get(access::resolve_access_query)
                .post(access::resolve_access_json)
                .fallback(method_not_allowed),
        )
        .route(
            "/submissions",
            post(submissions::create_submission).fallback(method_not_allowed),
        )
        .route(
            "/notifications",
            post(notifications::dispatch_notifications).fallback(method_not_allowed),
        )
        .route("/health", get(health::health_check));

    let page_routes = Router::new()
        .route("/", get(views::landing_page))
        .route("/access", get(views::enter_pin))
        .route("/unit/:token", get(views::unit_dashboard))
        .route("/unit/:token/:maintenance_type", get(views::maintenance_page))
        .route(
            "/unit/:token/:maintenance_type/complete",
            get(views::completion_page),
        );

    Router::new()
        .merge(page_routes)
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}
