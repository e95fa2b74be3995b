use serde::Deserialize;
use std::env;

use crate::error::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub lockout: LockoutConfig,
    pub rate_limit: RateLimitConfig,
    pub directory: DirectoryConfig,
    pub security: SecurityThresholds,
    pub retention: RetentionConfig,
    pub smtp: SmtpConfig,
    pub base_url: String,
    pub admin_emails: Vec<String>,
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
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Shared HS256 service secret.
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_failed_attempts: i32,
    pub lock_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_limit: u64,
    pub login_window_seconds: u64,
    pub password_reset_limit: u64,
    pub password_reset_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub service_id: String,
    pub service_token: String,
    pub service_secret: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub replay_window_secs: i64,
}

/// Tunable analytics thresholds; the mechanism is fixed, the numbers are not.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityThresholds {
    /// Advisory: flag when the trailing hour spans more than this many IPs.
    pub suspicious_distinct_ips: usize,
    /// Advisory: flag at this many login attempts in the trailing hour.
    pub suspicious_login_attempts: usize,
    /// Report a user once their hourly failure count reaches this.
    pub user_failure_alert: i64,
    /// Auto-lock a user at this many hourly failures.
    pub auto_lock_failures: i64,
    pub auto_lock_minutes: i64,
    /// Report an IP at this many hourly failures.
    pub ip_failure_alert: i64,
    /// Report an IP at this many hourly unknown-account lookups.
    pub enumeration_alert: i64,
}

impl Default for SecurityThresholds {
    fn default() -> Self {
        Self {
            suspicious_distinct_ips: 3,
            suspicious_login_attempts: 5,
            user_failure_alert: 5,
            auto_lock_failures: 10,
            auto_lock_minutes: 60,
            ip_failure_alert: 10,
            enumeration_alert: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub session_days: i64,
    pub audit_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| ServiceError::ValidationFailed(e))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("auth-core"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, true)?,
                issuer: get_env("JWT_ISSUER", Some("auth-core"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "60",
                    is_prod,
                )?,
            },
            session: SessionConfig {
                ttl_hours: parse_env("SESSION_TTL_HOURS", "24", is_prod)?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env("LOCKOUT_MAX_FAILED_ATTEMPTS", "5", is_prod)?,
                lock_minutes: parse_env("LOCKOUT_MINUTES", "30", is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_limit: parse_env("RATE_LIMIT_LOGIN_LIMIT", "10", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "300", is_prod)?,
                password_reset_limit: parse_env("RATE_LIMIT_PASSWORD_RESET_LIMIT", "3", is_prod)?,
                password_reset_window_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
            },
            directory: DirectoryConfig {
                base_url: get_env("ORG_DIRECTORY_URL", None, is_prod)?,
                service_id: get_env("SERVICE_ID", Some("auth-core"), is_prod)?,
                service_token: get_env("SERVICE_TOKEN", None, is_prod)?,
                service_secret: get_env("SERVICE_SECRET", None, is_prod)?,
                connect_timeout_secs: parse_env("ORG_DIRECTORY_CONNECT_TIMEOUT_SECS", "3", is_prod)?,
                request_timeout_secs: parse_env(
                    "ORG_DIRECTORY_REQUEST_TIMEOUT_SECS",
                    "10",
                    is_prod,
                )?,
                replay_window_secs: parse_env("SERVICE_SIGNATURE_REPLAY_WINDOW_SECS", "300", is_prod)?,
            },
            security: SecurityThresholds {
                suspicious_distinct_ips: parse_env("SECURITY_SUSPICIOUS_DISTINCT_IPS", "3", is_prod)?,
                suspicious_login_attempts: parse_env(
                    "SECURITY_SUSPICIOUS_LOGIN_ATTEMPTS",
                    "5",
                    is_prod,
                )?,
                user_failure_alert: parse_env("SECURITY_USER_FAILURE_ALERT", "5", is_prod)?,
                auto_lock_failures: parse_env("SECURITY_AUTO_LOCK_FAILURES", "10", is_prod)?,
                auto_lock_minutes: parse_env("SECURITY_AUTO_LOCK_MINUTES", "60", is_prod)?,
                ip_failure_alert: parse_env("SECURITY_IP_FAILURE_ALERT", "10", is_prod)?,
                enumeration_alert: parse_env("SECURITY_ENUMERATION_ALERT", "20", is_prod)?,
            },
            retention: RetentionConfig {
                session_days: parse_env("SESSION_RETENTION_DAYS", "30", is_prod)?,
                audit_days: parse_env("AUDIT_RETENTION_DAYS", "90", is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                username: get_env("SMTP_USERNAME", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_address: get_env("SMTP_FROM", Some("no-reply@localhost"), is_prod)?,
            },
            base_url: get_env("BASE_URL", Some("http://localhost:3000"), is_prod)?,
            admin_emails: get_env("ADMIN_EMAILS", Some(""), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.jwt.secret.len() < 32 {
            return Err(ServiceError::ValidationFailed(
                "JWT_SECRET must be at least 32 bytes".to_string(),
            ));
        }
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(ServiceError::ValidationFailed(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }
        if self.session.ttl_hours <= 0 {
            return Err(ServiceError::ValidationFailed(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }
        if self.lockout.max_failed_attempts <= 0 {
            return Err(ServiceError::ValidationFailed(
                "LOCKOUT_MAX_FAILED_ATTEMPTS must be positive".to_string(),
            ));
        }
        if self.rate_limit.login_limit == 0 || self.rate_limit.password_reset_limit == 0 {
            return Err(ServiceError::ValidationFailed(
                "rate limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ServiceError::ValidationFailed(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ServiceError::ValidationFailed(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| ServiceError::ValidationFailed(format!("{}: {}", key, e)))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AuthConfig {
        AuthConfig {
            environment: Environment::Dev,
            service_name: "auth-core".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/auth".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost".to_string(),
            },
            jwt: JwtConfig {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
                issuer: "auth-core".to_string(),
                access_token_expiry_minutes: 60,
            },
            session: SessionConfig { ttl_hours: 24 },
            lockout: LockoutConfig {
                max_failed_attempts: 5,
                lock_minutes: 30,
            },
            rate_limit: RateLimitConfig {
                login_limit: 10,
                login_window_seconds: 300,
                password_reset_limit: 3,
                password_reset_window_seconds: 3600,
            },
            directory: DirectoryConfig {
                base_url: "http://org-service".to_string(),
                service_id: "auth-core".to_string(),
                service_token: "token".to_string(),
                service_secret: "secret".to_string(),
                connect_timeout_secs: 3,
                request_timeout_secs: 10,
                replay_window_secs: 300,
            },
            security: SecurityThresholds::default(),
            retention: RetentionConfig {
                session_days: 30,
                audit_days: 90,
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                username: String::new(),
                password: String::new(),
                from_address: "no-reply@localhost".to_string(),
            },
            base_url: "http://localhost:3000".to_string(),
            admin_emails: vec![],
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_jwt_secret_rejected() {
        let mut config = base_config();
        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_lockout_threshold_rejected() {
        let mut config = base_config();
        config.lockout.max_failed_attempts = 0;
        assert!(config.validate().is_err());
    }
}
