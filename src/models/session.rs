//! User session model - device-bound token pairs that access tokens are
//! minted against.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Session lifecycle state.
///
/// `Active -> Expired` is time-driven, `Active -> Revoked` is action-driven
/// (logout, logout-all, password change/reset, targeted revoke). Neither is
/// reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            "revoked" => Ok(SessionStatus::Revoked),
            other => Err(format!("Invalid session status: {}", other)),
        }
    }
}

/// Kind of client device that opened the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Mobile,
    Api,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Web => "web",
            DeviceType::Mobile => "mobile",
            DeviceType::Api => "api",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(DeviceType::Web),
            "mobile" => Ok(DeviceType::Mobile),
            "api" => Ok(DeviceType::Api),
            _ => Ok(DeviceType::Unknown),
        }
    }
}

/// Device metadata captured at session creation, passed explicitly by the
/// boundary (headers / user agent parsing happen there).
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub device_type: Option<DeviceType>,
    pub device_name: Option<String>,
}

/// One authenticated device binding.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_token: String,
    pub refresh_token: String,
    pub device_id: Option<String>,
    pub device_type: String,
    pub device_name: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a new active session for a user.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        session_token: String,
        refresh_token: String,
        device: DeviceInfo,
        ip_address: String,
        user_agent: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_token,
            refresh_token,
            device_id: device.device_id,
            device_type: device
                .device_type
                .unwrap_or(DeviceType::Unknown)
                .as_str()
                .to_string(),
            device_name: device.device_name,
            ip_address,
            user_agent,
            status: SessionStatus::Active.as_str().to_string(),
            created_at: now,
            last_accessed: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// A session is live iff it is active and not past its expiry.
    pub fn is_live(&self) -> bool {
        self.status == SessionStatus::Active.as_str() && !self.is_expired()
    }
}

/// Session listing entry for API responses.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub device_type: String,
    pub device_name: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.id,
            device_type: s.device_type,
            device_name: s.device_name,
            ip_address: s.ip_address,
            created_at: s.created_at,
            last_accessed: s.last_accessed,
            expires_at: s.expires_at,
            is_current: false, // Set by caller
        }
    }
}
