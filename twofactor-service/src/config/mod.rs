use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::engine::EnginePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct TwoFactorConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub policy: PolicyConfig,
    pub sms: SmsConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Master key the secret cipher derives its AEAD key from.
    pub master_key: String,
    pub totp_issuer: String,
    pub allowed_origins: Vec<String>,
}

/// Thresholds and timers for the engine. The lockout duration and the two
/// re-verification windows are independent settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
    pub member_reverify_minutes: i64,
    pub admin_reverify_minutes: i64,
    pub session_ttl_minutes: i64,
    pub session_max_attempts: i32,
    pub sms_code_length: usize,
    pub sms_hourly_limit: i32,
    pub backup_code_count: usize,
    pub backup_code_length: usize,
    pub backup_code_ttl_days: i64,
    pub attempt_retention_days: i64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_key: String,
    pub sender_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub verify_attempts: u32,
    pub verify_window_seconds: u64,
    pub sms_send_attempts: u32,
    pub sms_send_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl TwoFactorConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = TwoFactorConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("twofactor-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            security: SecurityConfig {
                master_key: get_env(
                    "TWOFACTOR_MASTER_KEY",
                    Some("dev-only-master-key-do-not-use-in-prod"),
                    is_prod,
                )?,
                totp_issuer: get_env("TOTP_ISSUER", Some("Association"), is_prod)?,
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            policy: PolicyConfig {
                max_failed_attempts: parse_env("TWOFACTOR_MAX_FAILED_ATTEMPTS", "5", is_prod)?,
                lockout_minutes: parse_env("TWOFACTOR_LOCKOUT_MINUTES", "15", is_prod)?,
                member_reverify_minutes: parse_env(
                    "TWOFACTOR_MEMBER_REVERIFY_MINUTES",
                    "30",
                    is_prod,
                )?,
                admin_reverify_minutes: parse_env(
                    "TWOFACTOR_ADMIN_REVERIFY_MINUTES",
                    "15",
                    is_prod,
                )?,
                session_ttl_minutes: parse_env("TWOFACTOR_SESSION_TTL_MINUTES", "10", is_prod)?,
                session_max_attempts: parse_env("TWOFACTOR_SESSION_MAX_ATTEMPTS", "5", is_prod)?,
                sms_code_length: parse_env("TWOFACTOR_SMS_CODE_LENGTH", "6", is_prod)?,
                sms_hourly_limit: parse_env("TWOFACTOR_SMS_HOURLY_LIMIT", "5", is_prod)?,
                backup_code_count: parse_env("TWOFACTOR_BACKUP_CODE_COUNT", "10", is_prod)?,
                backup_code_length: parse_env("TWOFACTOR_BACKUP_CODE_LENGTH", "10", is_prod)?,
                backup_code_ttl_days: parse_env("TWOFACTOR_BACKUP_CODE_TTL_DAYS", "365", is_prod)?,
                attempt_retention_days: parse_env(
                    "TWOFACTOR_ATTEMPT_RETENTION_DAYS",
                    "90",
                    is_prod,
                )?,
                cleanup_interval_seconds: parse_env(
                    "TWOFACTOR_CLEANUP_INTERVAL_SECONDS",
                    "300",
                    is_prod,
                )?,
            },
            sms: SmsConfig {
                gateway_url: get_env(
                    "SMS_GATEWAY_URL",
                    Some("http://notification-service:8080"),
                    is_prod,
                )?,
                api_key: get_env("SMS_GATEWAY_API_KEY", Some("dev-only-key"), is_prod)?,
                sender_id: get_env("SMS_SENDER_ID", Some("Association"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                verify_attempts: parse_env("RATE_LIMIT_VERIFY_ATTEMPTS", "10", is_prod)?,
                verify_window_seconds: parse_env("RATE_LIMIT_VERIFY_WINDOW_SECONDS", "60", is_prod)?,
                sms_send_attempts: parse_env("RATE_LIMIT_SMS_SEND_ATTEMPTS", "3", is_prod)?,
                sms_send_window_seconds: parse_env(
                    "RATE_LIMIT_SMS_SEND_WINDOW_SECONDS",
                    "300",
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            totp_issuer: self.security.totp_issuer.clone(),
            max_failed_attempts: self.policy.max_failed_attempts,
            lockout_minutes: self.policy.lockout_minutes,
            member_reverify_minutes: self.policy.member_reverify_minutes,
            admin_reverify_minutes: self.policy.admin_reverify_minutes,
            session_ttl_minutes: self.policy.session_ttl_minutes,
            session_max_attempts: self.policy.session_max_attempts,
            sms_code_length: self.policy.sms_code_length,
            sms_hourly_limit: self.policy.sms_hourly_limit,
            backup_code_count: self.policy.backup_code_count,
            backup_code_length: self.policy.backup_code_length,
            backup_code_ttl_days: self.policy.backup_code_ttl_days,
            attempt_retention_days: self.policy.attempt_retention_days,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.policy.max_failed_attempts <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TWOFACTOR_MAX_FAILED_ATTEMPTS must be positive"
            )));
        }

        if self.policy.lockout_minutes <= 0 || self.policy.session_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Lockout and session TTL minutes must be positive"
            )));
        }

        if self.security.master_key.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TWOFACTOR_MASTER_KEY must be at least 32 characters"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
