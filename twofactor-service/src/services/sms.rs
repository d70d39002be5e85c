//! Outbound SMS dispatch.
//!
//! Delivery goes through the platform's notification gateway over HTTP;
//! this service never talks to a carrier directly.

use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmsConfig;

#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Best-effort dispatch of a verification code.
    async fn send_code(&self, phone_number: &str, code: &str) -> Result<(), AppError>;
}

/// HTTP client for the notification gateway.
#[derive(Clone)]
pub struct HttpSmsProvider {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
    sender_id: String,
}

impl HttpSmsProvider {
    pub fn new(config: &SmsConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        tracing::info!(gateway = %config.gateway_url, "SMS provider initialized");

        Ok(Self {
            client,
            gateway_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
            sender_id: config.sender_id.clone(),
        })
    }
}

#[async_trait]
impl SmsProvider for HttpSmsProvider {
    async fn send_code(&self, phone_number: &str, code: &str) -> Result<(), AppError> {
        let body = serde_json::json!({
            "to": phone_number,
            "from": self.sender_id,
            "body": format!("{} is your verification code. It expires in 10 minutes.", code),
        });

        let response = self
            .client
            .post(format!("{}/messages", self.gateway_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "SMS gateway unreachable");
                AppError::DependencyError(anyhow::anyhow!("SMS dispatch failed"))
            })?;

        if !response.status().is_success() {
            tracing::error!(
                status = %response.status(),
                to = %redact_phone(phone_number),
                "SMS gateway rejected message"
            );
            return Err(AppError::DependencyError(anyhow::anyhow!(
                "SMS dispatch failed"
            )));
        }

        tracing::info!(to = %redact_phone(phone_number), "SMS code dispatched");
        Ok(())
    }
}

/// Mock provider that records sends instead of dispatching.
#[derive(Default)]
pub struct MockSmsProvider {
    sent: Mutex<Vec<(String, String)>>,
}

impl MockSmsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// (phone, code) pairs in dispatch order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("mock sms mutex poisoned").clone()
    }
}

#[async_trait]
impl SmsProvider for MockSmsProvider {
    async fn send_code(&self, phone_number: &str, code: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .expect("mock sms mutex poisoned")
            .push((phone_number.to_string(), code.to_string()));
        Ok(())
    }
}

/// Provider that always fails; for exercising dependency-error paths.
#[derive(Default)]
pub struct FailingSmsProvider;

#[async_trait]
impl SmsProvider for FailingSmsProvider {
    async fn send_code(&self, _phone_number: &str, _code: &str) -> Result<(), AppError> {
        Err(AppError::DependencyError(anyhow::anyhow!(
            "SMS dispatch failed"
        )))
    }
}

fn redact_phone(phone: &str) -> String {
    if phone.len() <= 2 {
        "*".repeat(phone.len())
    } else {
        format!("{}{}", "*".repeat(phone.len() - 2), &phone[phone.len() - 2..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_keeps_last_two_digits() {
        assert_eq!(redact_phone("+4512345678"), "*********78");
        assert_eq!(redact_phone("12"), "**");
    }

    #[tokio::test]
    async fn mock_records_sends() {
        let mock = MockSmsProvider::new();
        mock.send_code("+4512345678", "123456").await.expect("send");
        assert_eq!(
            mock.sent(),
            vec![("+4512345678".to_string(), "123456".to_string())]
        );
    }
}
