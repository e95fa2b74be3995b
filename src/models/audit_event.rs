//! Audit event model - append-only security event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailed,
    Logout,
    LogoutAll,
    PasswordChanged,
    PasswordResetRequested,
    PasswordResetCompleted,
    EmailVerified,
    AccountLocked,
    SessionRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::LogoutAll => "logout_all",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::PasswordResetRequested => "password_reset_requested",
            AuditAction::PasswordResetCompleted => "password_reset_completed",
            AuditAction::EmailVerified => "email_verified",
            AuditAction::AccountLocked => "account_locked",
            AuditAction::SessionRevoked => "session_revoked",
        }
    }
}

/// Immutable audit record. `user_id` is absent for failures that never
/// resolved to an account (unknown email lookups).
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        user_id: Option<Uuid>,
        ip_address: impl Into<String>,
        user_agent: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.as_str().to_string(),
            ip_address: ip_address.into(),
            user_agent,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Per-IP failure aggregate used by the periodic abuse scan.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IpFailureCount {
    pub ip_address: String,
    pub failures: i64,
    pub distinct_users: i64,
}

/// Per-user failure aggregate used by the periodic abuse scan.
#[derive(Debug, Clone, FromRow)]
pub struct UserFailureCount {
    pub user_id: Uuid,
    pub failures: i64,
    pub distinct_ips: i64,
}
