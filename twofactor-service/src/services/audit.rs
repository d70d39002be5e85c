//! Audit event collaborator.
//!
//! Sink failures must never fail the primary operation, so `record` is
//! infallible from the engine's perspective; implementations log and drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::RequestContext;

/// Audit event types emitted by the two-factor engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SetupStarted,
    TwoFactorEnabled,
    TwoFactorDisabled,
    AdminForceDisabled,
    BackupCodesRegenerated,
    SmsCodeSent,
    AccountLocked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::SetupStarted => "setup_started",
            AuditEventType::TwoFactorEnabled => "two_factor_enabled",
            AuditEventType::TwoFactorDisabled => "two_factor_disabled",
            AuditEventType::AdminForceDisabled => "admin_force_disabled",
            AuditEventType::BackupCodesRegenerated => "backup_codes_regenerated",
            AuditEventType::SmsCodeSent => "sms_code_sent",
            AuditEventType::AccountLocked => "account_locked",
        }
    }
}

/// Structured audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: AuditEventType,
    /// User the event is about.
    pub user_id: Uuid,
    /// Acting administrator, when distinct from the subject.
    pub actor_admin_id: Option<Uuid>,
    pub event_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn user_action(
        event_type: AuditEventType,
        user_id: Uuid,
        event_data: Option<serde_json::Value>,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            user_id,
            actor_admin_id: None,
            event_data,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            created_utc: now,
        }
    }

    pub fn admin_action(
        event_type: AuditEventType,
        actor_admin_id: Uuid,
        target_user_id: Uuid,
        event_data: Option<serde_json::Value>,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            user_id: target_user_id,
            actor_admin_id: Some(actor_admin_id),
            event_data,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            created_utc: now,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Fire-and-forget append of an audit event.
    async fn record(&self, event: AuditEvent);
}

/// Sink that emits events on the `audit` tracing target. The log pipeline
/// ships them to the platform's event collector.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            event_type = event.event_type.as_str(),
            user_id = %event.user_id,
            actor_admin_id = ?event.actor_admin_id,
            data = ?event.event_data,
            "Audit event"
        );
    }
}

/// Capturing sink for tests.
#[derive(Default)]
pub struct CapturingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl CapturingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for CapturingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit mutex poisoned").push(event);
    }
}
