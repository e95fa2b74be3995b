//! Repository layer.
//!
//! The engine only sees these traits; PostgreSQL and Redis back them in
//! production while the in-memory implementations keep the services
//! unit-testable without infrastructure.

mod memory;
mod postgres;
mod redis;

pub use memory::{MemoryCounterStore, MemoryStore};
pub use postgres::Database;
pub use redis::RedisCounterStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{
    AuditAction, AuditEvent, AuthUser, EphemeralToken, IpFailureCount, Session, TokenPurpose,
    UserFailureCount,
};

/// Outcome of an atomic failed-login increment.
#[derive(Debug, Clone, Copy)]
pub struct LoginFailure {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Owns `AuthUser` rows: password hash, lock state, failure counters.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_user(&self, user: &AuthUser) -> Result<(), ServiceError>;

    /// Lookup by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>, ServiceError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<AuthUser>, ServiceError>;

    /// Reset the failure counter, clear any lock and stamp `last_login`.
    async fn record_login_success(&self, user_id: Uuid) -> Result<(), ServiceError>;

    /// Increment the failure counter and, if the new count reaches
    /// `lock_threshold`, set the lock. Counter update and threshold check are
    /// a single atomic operation; two concurrent failures cannot both skip
    /// the lock.
    async fn record_login_failure(
        &self,
        user_id: Uuid,
        lock_threshold: i32,
        lock_duration: Duration,
    ) -> Result<LoginFailure, ServiceError>;

    /// Replace the password hash and bump `password_changed_at`, which
    /// invalidates every access token minted before this call.
    async fn update_password(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), ServiceError>;

    async fn set_verified(&self, user_id: Uuid) -> Result<(), ServiceError>;

    /// Lock an account until the given instant (auto-lock / admin action).
    async fn lock_until(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<(), ServiceError>;

    async fn count_locked(&self, now: DateTime<Utc>) -> Result<i64, ServiceError>;
}

/// Owns `Session` rows: token pairs, device metadata, status.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), ServiceError>;

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError>;

    async fn find_active_by_session_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError>;

    async fn find_active_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError>;

    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError>;

    /// Stamp `last_accessed`.
    async fn touch(&self, session_id: Uuid) -> Result<(), ServiceError>;

    /// Swap in a fresh token pair and expiry. Returns false when the session
    /// is no longer active, so a concurrent revoke wins over the rotation.
    async fn rotate_tokens(
        &self,
        session_id: Uuid,
        session_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    async fn mark_expired(&self, session_id: Uuid) -> Result<(), ServiceError>;

    /// Returns false when the session was not active.
    async fn revoke(&self, session_id: Uuid) -> Result<bool, ServiceError>;

    /// Revoke every active session of a user, optionally sparing one
    /// (the caller's current session). Returns the number revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<u64, ServiceError>;

    /// Lazy write-path sweep: flip the user's overdue active sessions.
    async fn expire_overdue_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;

    /// Global sweep used by the scheduled job.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;

    /// Drop sessions past the retention horizon regardless of status.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError>;

    async fn count_active(&self) -> Result<i64, ServiceError>;
}

/// Owns single-use verification / password-reset tokens.
#[async_trait]
pub trait EphemeralTokenStore: Send + Sync {
    /// Mark every unused token of the same (user, purpose) as used, then
    /// insert the new one. The two steps are atomic so at most one valid
    /// token per purpose per user ever exists.
    async fn insert_superseding(&self, token: &EphemeralToken) -> Result<(), ServiceError>;

    async fn find_by_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<EphemeralToken>, ServiceError>;

    /// Returns false when the token was already used; guards single use
    /// under concurrent confirmation attempts.
    async fn mark_used(&self, token_id: Uuid) -> Result<bool, ServiceError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// Append-only event sink plus the aggregations the analytics need.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), ServiceError>;

    async fn events_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AuditEvent>, ServiceError>;

    async fn count_since(
        &self,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> Result<i64, ServiceError>;

    async fn failed_logins_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<IpFailureCount>, ServiceError>;

    async fn failed_logins_by_user(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<UserFailureCount>, ServiceError>;

    /// Failures with no resolvable user and reason `user_not_found`,
    /// grouped by source IP (account enumeration probes).
    async fn not_found_failures_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<IpFailureCount>, ServiceError>;

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// Narrow interface over an atomic counter service with TTL; backs the rate
/// limiter. No in-process global state.
#[async_trait]
pub trait RateCounterStore: Send + Sync {
    /// Atomically increment `key`, creating it with the window as TTL, and
    /// return the post-increment count.
    async fn increment(&self, key: &str, window: StdDuration) -> Result<u64, ServiceError>;
}
