//! Two-factor member-facing handlers.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use service_core::error::AppError;

use crate::dtos::twofactor::{
    CreateSessionRequest, CreateSessionResponse, DisableRequest, EnableRequest, EnableResponse,
    MessageResponse, RegenerateBackupCodesResponse, SendSmsResponse, SessionVerifyRequest,
    SessionVerifyResponse, SetupRequest, SetupResponse, StatusResponse, VerifyRequest,
    VerifyResponse,
};
use crate::handlers::{ClientMeta, GatewayUser};
use crate::AppState;

/// GET /2fa/status
pub async fn get_status(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.engine.get_status(user_id).await?;
    Ok(Json(status.into()))
}

/// POST /2fa/setup
#[tracing::instrument(skip(state, req), fields(user_id = %user_id, method = ?req.method))]
pub async fn setup(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
    ClientMeta(ctx): ClientMeta,
    Json(req): Json<SetupRequest>,
) -> Result<(StatusCode, Json<SetupResponse>), AppError> {
    let outcome = state
        .engine
        .setup(user_id, req.method, req.phone_number, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// POST /2fa/enable
#[tracing::instrument(skip(state, req), fields(user_id = %user_id))]
pub async fn enable(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
    ClientMeta(ctx): ClientMeta,
    Json(req): Json<EnableRequest>,
) -> Result<Json<EnableResponse>, AppError> {
    let backup_codes = state
        .engine
        .enable_with_code(user_id, &req.code, &ctx)
        .await?;
    Ok(Json(EnableResponse {
        enabled: true,
        backup_codes,
    }))
}

/// POST /2fa/verify
#[tracing::instrument(skip(state, req), fields(user_id = %user_id))]
pub async fn verify(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
    ClientMeta(ctx): ClientMeta,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    state
        .engine
        .verify(user_id, &req.code, req.method, &ctx)
        .await?;
    Ok(Json(VerifyResponse { verified: true }))
}

/// POST /2fa/disable
#[tracing::instrument(skip(state, req), fields(user_id = %user_id))]
pub async fn disable(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
    ClientMeta(ctx): ClientMeta,
    Json(req): Json<DisableRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.engine.disable(user_id, &req.code, &ctx).await?;
    Ok(Json(MessageResponse {
        message: "Two-factor authentication disabled".to_string(),
    }))
}

/// POST /2fa/backup-codes/regenerate
#[tracing::instrument(skip(state), fields(user_id = %user_id))]
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
    ClientMeta(ctx): ClientMeta,
) -> Result<Json<RegenerateBackupCodesResponse>, AppError> {
    let backup_codes = state.engine.regenerate_backup_codes(user_id, &ctx).await?;
    Ok(Json(RegenerateBackupCodesResponse { backup_codes }))
}

/// POST /2fa/sms/send
#[tracing::instrument(skip(state), fields(user_id = %user_id))]
pub async fn send_sms_code(
    State(state): State<AppState>,
    GatewayUser(user_id): GatewayUser,
    ClientMeta(ctx): ClientMeta,
) -> Result<Json<SendSmsResponse>, AppError> {
    let dispatch = state.engine.send_sms_code(user_id, &ctx).await?;
    Ok(Json(dispatch.into()))
}

/// POST /2fa/sessions
///
/// Called by the auth service once the primary credential has verified.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn create_session(
    State(state): State<AppState>,
    ClientMeta(ctx): ClientMeta,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let challenge = state
        .engine
        .create_login_session(req.user_id, req.email, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(challenge.into())))
}

/// POST /2fa/sessions/verify
#[tracing::instrument(skip(state, req))]
pub async fn verify_session(
    State(state): State<AppState>,
    ClientMeta(ctx): ClientMeta,
    Json(req): Json<SessionVerifyRequest>,
) -> Result<Json<SessionVerifyResponse>, AppError> {
    let user_id = state
        .engine
        .verify_login_session(&req.session_token, &req.code, req.method, &ctx)
        .await?;
    Ok(Json(SessionVerifyResponse {
        user_id,
        verified: true,
    }))
}
