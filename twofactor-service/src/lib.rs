pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{ip_rate_limit_middleware, IpRateLimiter};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::TwoFactorConfig;
use crate::services::{TwoFactorEngine, TwoFactorStore};

#[derive(Clone)]
pub struct AppState {
    pub config: TwoFactorConfig,
    pub store: Arc<dyn TwoFactorStore>,
    pub engine: Arc<TwoFactorEngine>,
    pub verify_rate_limiter: IpRateLimiter,
    pub sms_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    // Code-guessing surfaces get their own tighter limits on top of the
    // global IP budget.
    let verify_limiter = state.verify_rate_limiter.clone();
    let verify_routes = Router::new()
        .route("/2fa/verify", post(handlers::twofactor::verify))
        .route("/2fa/enable", post(handlers::twofactor::enable))
        .route("/2fa/disable", post(handlers::twofactor::disable))
        .route(
            "/2fa/sessions/verify",
            post(handlers::twofactor::verify_session),
        )
        .layer(from_fn_with_state(verify_limiter, ip_rate_limit_middleware));

    let sms_limiter = state.sms_rate_limiter.clone();
    let sms_routes = Router::new()
        .route("/2fa/sms/send", post(handlers::twofactor::send_sms_code))
        .layer(from_fn_with_state(sms_limiter, ip_rate_limit_middleware));

    let ip_limiter = state.ip_rate_limiter.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/2fa/status", get(handlers::twofactor::get_status))
        .route("/2fa/setup", post(handlers::twofactor::setup))
        .route(
            "/2fa/backup-codes/regenerate",
            post(handlers::twofactor::regenerate_backup_codes),
        )
        .route("/2fa/sessions", post(handlers::twofactor::create_session))
        .route(
            "/2fa/admin/users/:user_id/disable",
            post(handlers::admin::force_disable),
        )
        .merge(verify_routes)
        .merge(sms_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-user-id"),
                    axum::http::header::HeaderName::from_static("x-admin-id"),
                    axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        )
}

/// Service health check.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
