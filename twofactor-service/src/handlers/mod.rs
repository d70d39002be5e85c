//! HTTP handlers and gateway extractors.
//!
//! The API gateway authenticates callers upstream and forwards identity in
//! `x-user-id` / `x-admin-id` headers; this service trusts those headers
//! on its internal network.

pub mod admin;
pub mod twofactor;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use service_core::error::{AppError, SecurityViolation};
use uuid::Uuid;

use crate::models::RequestContext;

/// Authenticated member identity forwarded by the gateway.
pub struct GatewayUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for GatewayUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_id_header(parts, "x-user-id").map(GatewayUser)
    }
}

/// Acting administrator identity forwarded by the gateway. Role checks
/// happen upstream; this service only needs the identity for auditing.
pub struct GatewayAdmin(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for GatewayAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_id_header(parts, "x-admin-id").map(GatewayAdmin)
    }
}

/// Client IP and user agent, stamped onto attempts and audit events.
pub struct ClientMeta(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string());

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Ok(ClientMeta(RequestContext {
            ip_address,
            user_agent,
        }))
    }
}

fn parse_id_header(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok())
        .ok_or(AppError::SecurityError(SecurityViolation::InvalidSession))
}
