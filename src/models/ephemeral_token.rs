//! Single-use tokens for email verification and password reset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }

    /// How long a freshly issued token of this purpose stays valid.
    pub fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::EmailVerification => Duration::hours(24),
            TokenPurpose::PasswordReset => Duration::hours(1),
        }
    }
}

/// One-shot token record. At most one unused token exists per
/// (user, purpose) at any time; issuing a new one supersedes the rest.
#[derive(Debug, Clone, FromRow)]
pub struct EphemeralToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl EphemeralToken {
    pub fn new(user_id: Uuid, purpose: TokenPurpose, token: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            purpose: purpose.as_str().to_string(),
            token,
            created_at: now,
            expires_at: now + purpose.ttl(),
            is_used: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Valid iff unused and unexpired.
    pub fn is_valid(&self) -> bool {
        !self.is_used && !self.is_expired()
    }
}
