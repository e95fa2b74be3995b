//! Auth user model - credential records owned by this service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Credential record for one account.
///
/// Created by the provisioning flow; mutated here on every login attempt and
/// password change. Never hard-deleted by this core (the directory
/// soft-deactivates via `is_active`).
#[derive(Debug, Clone, FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthUser {
    /// Create a new user record. `email` must already be normalized.
    pub fn new(email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            is_active: true,
            is_verified: false,
            failed_attempts: 0,
            locked_until: None,
            password_changed_at: now,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account is currently locked out.
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| until > Utc::now())
    }

    /// Snapshot of `password_changed_at` as epoch seconds, as embedded in
    /// access-token claims.
    pub fn password_epoch(&self) -> i64 {
        self.password_changed_at.timestamp()
    }

    /// Convert to a response shape without sensitive fields.
    pub fn sanitized(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
            is_verified: self.is_verified,
            last_login: self.last_login,
        }
    }
}

/// User info safe to return to clients.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub is_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
}
