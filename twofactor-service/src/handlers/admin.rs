//! Administrative handlers.

use axum::{
    extract::{Json, Path, State},
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::twofactor::MessageResponse;
use crate::handlers::{ClientMeta, GatewayAdmin};
use crate::AppState;

/// POST /2fa/admin/users/{user_id}/disable
///
/// Bypasses the member's re-auth; audited with the acting admin identity.
#[tracing::instrument(skip(state), fields(admin_id = %admin_id, user_id = %user_id))]
pub async fn force_disable(
    State(state): State<AppState>,
    GatewayAdmin(admin_id): GatewayAdmin,
    ClientMeta(ctx): ClientMeta,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .engine
        .admin_force_disable(admin_id, user_id, &ctx)
        .await?;
    Ok(Json(MessageResponse {
        message: "Two-factor authentication disabled for user".to_string(),
    }))
}
