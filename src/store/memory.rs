//! In-memory store implementations.
//!
//! Mutex-guarded maps with the same semantics as the PostgreSQL layer; used
//! by engine tests so no database or Redis is needed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration as StdDuration, Instant};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{
    AuditAction, AuditEvent, AuthUser, EphemeralToken, IpFailureCount, Session, SessionStatus,
    TokenPurpose, UserFailureCount,
};
use crate::store::{
    AuditLogStore, CredentialStore, EphemeralTokenStore, LoginFailure, RateCounterStore,
    SessionStore,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("store mutex poisoned: {}", e)))
}

/// In-memory implementation of the credential, session, token and audit
/// stores.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, AuthUser>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    tokens: Mutex<HashMap<Uuid, EphemeralToken>>,
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: &AuthUser) -> Result<(), ServiceError> {
        let mut users = lock(&self.users)?;
        if users.values().any(|u| u.email == user.email) {
            return Err(ServiceError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>, ServiceError> {
        let users = lock(&self.users)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<AuthUser>, ServiceError> {
        let users = lock(&self.users)?;
        Ok(users.get(&user_id).cloned())
    }

    async fn record_login_success(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut users = lock(&self.users)?;
        if let Some(user) = users.get_mut(&user_id) {
            user.failed_attempts = 0;
            user.locked_until = None;
            user.last_login = Some(Utc::now());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        lock_threshold: i32,
        lock_duration: Duration,
    ) -> Result<LoginFailure, ServiceError> {
        let mut users = lock(&self.users)?;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("user not found")))?;

        // Single critical section, mirroring the atomic UPDATE.
        user.failed_attempts += 1;
        if user.failed_attempts >= lock_threshold {
            user.locked_until = Some(Utc::now() + lock_duration);
        }
        user.updated_at = Utc::now();

        Ok(LoginFailure {
            failed_attempts: user.failed_attempts,
            locked_until: user.locked_until,
        })
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let mut users = lock(&self.users)?;
        if let Some(user) = users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.password_changed_at = Utc::now();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_verified(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut users = lock(&self.users)?;
        if let Some(user) = users.get_mut(&user_id) {
            user.is_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn lock_until(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut users = lock(&self.users)?;
        if let Some(user) = users.get_mut(&user_id) {
            user.locked_until = Some(until);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count_locked(&self, now: DateTime<Utc>) -> Result<i64, ServiceError> {
        let users = lock(&self.users)?;
        Ok(users
            .values()
            .filter(|u| u.locked_until.is_some_and(|until| until > now))
            .count() as i64)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &Session) -> Result<(), ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        if sessions.values().any(|s| {
            s.session_token == session.session_token || s.refresh_token == session.refresh_token
        }) {
            return Err(ServiceError::Conflict("duplicate session token".into()));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        let sessions = lock(&self.sessions)?;
        Ok(sessions.get(&session_id).cloned())
    }

    async fn find_active_by_session_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let sessions = lock(&self.sessions)?;
        Ok(sessions
            .values()
            .find(|s| s.session_token == token && s.status == SessionStatus::Active.as_str())
            .cloned())
    }

    async fn find_active_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let sessions = lock(&self.sessions)?;
        Ok(sessions
            .values()
            .find(|s| s.refresh_token == token && s.status == SessionStatus::Active.as_str())
            .cloned())
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let sessions = lock(&self.sessions)?;
        let mut active: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_live())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        Ok(active)
    }

    async fn touch(&self, session_id: Uuid) -> Result<(), ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.last_accessed = Utc::now();
        }
        Ok(())
    }

    async fn rotate_tokens(
        &self,
        session_id: Uuid,
        session_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        match sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::Active.as_str() => {
                session.session_token = session_token.to_string();
                session.refresh_token = refresh_token.to_string();
                session.expires_at = expires_at;
                session.last_accessed = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_expired(&self, session_id: Uuid) -> Result<(), ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        if let Some(session) = sessions.get_mut(&session_id) {
            if session.status == SessionStatus::Active.as_str() {
                session.status = SessionStatus::Expired.as_str().to_string();
            }
        }
        Ok(())
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        match sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::Active.as_str() => {
                session.status = SessionStatus::Revoked.as_str().to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<u64, ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        let mut revoked = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id
                && session.status == SessionStatus::Active.as_str()
                && keep != Some(session.id)
            {
                session.status = SessionStatus::Revoked.as_str().to_string();
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn expire_overdue_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id
                && session.status == SessionStatus::Active.as_str()
                && session.expires_at < now
            {
                session.status = SessionStatus::Expired.as_str().to_string();
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.status == SessionStatus::Active.as_str() && session.expires_at < now {
                session.status = SessionStatus::Expired.as_str().to_string();
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut sessions = lock(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.created_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }

    async fn count_active(&self) -> Result<i64, ServiceError> {
        let sessions = lock(&self.sessions)?;
        Ok(sessions.values().filter(|s| s.is_live()).count() as i64)
    }
}

#[async_trait]
impl EphemeralTokenStore for MemoryStore {
    async fn insert_superseding(&self, token: &EphemeralToken) -> Result<(), ServiceError> {
        let mut tokens = lock(&self.tokens)?;
        for existing in tokens.values_mut() {
            if existing.user_id == token.user_id && existing.purpose == token.purpose {
                existing.is_used = true;
            }
        }
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<EphemeralToken>, ServiceError> {
        let tokens = lock(&self.tokens)?;
        Ok(tokens
            .values()
            .find(|t| t.purpose == purpose.as_str() && t.token == token)
            .cloned())
    }

    async fn mark_used(&self, token_id: Uuid) -> Result<bool, ServiceError> {
        let mut tokens = lock(&self.tokens)?;
        match tokens.get_mut(&token_id) {
            Some(token) if !token.is_used => {
                token.is_used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut tokens = lock(&self.tokens)?;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl AuditLogStore for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), ServiceError> {
        lock(&self.events)?.push(event.clone());
        Ok(())
    }

    async fn events_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AuditEvent>, ServiceError> {
        let events = lock(&self.events)?;
        let mut matching: Vec<AuditEvent> = events
            .iter()
            .filter(|e| e.user_id == Some(user_id) && e.created_at >= since)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn count_since(
        &self,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let events = lock(&self.events)?;
        Ok(events
            .iter()
            .filter(|e| e.action == action.as_str() && e.created_at >= since)
            .count() as i64)
    }

    async fn failed_logins_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<IpFailureCount>, ServiceError> {
        let events = lock(&self.events)?;
        let mut by_ip: HashMap<String, (i64, std::collections::HashSet<Uuid>)> = HashMap::new();
        for event in events
            .iter()
            .filter(|e| e.action == AuditAction::LoginFailed.as_str() && e.created_at >= since)
        {
            let entry = by_ip.entry(event.ip_address.clone()).or_default();
            entry.0 += 1;
            if let Some(user_id) = event.user_id {
                entry.1.insert(user_id);
            }
        }
        let mut rows: Vec<IpFailureCount> = by_ip
            .into_iter()
            .filter(|(_, (count, _))| *count >= min_count)
            .map(|(ip_address, (failures, users))| IpFailureCount {
                ip_address,
                failures,
                distinct_users: users.len() as i64,
            })
            .collect();
        rows.sort_by(|a, b| b.failures.cmp(&a.failures));
        Ok(rows)
    }

    async fn failed_logins_by_user(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<UserFailureCount>, ServiceError> {
        let events = lock(&self.events)?;
        let mut by_user: HashMap<Uuid, (i64, std::collections::HashSet<String>)> = HashMap::new();
        for event in events
            .iter()
            .filter(|e| e.action == AuditAction::LoginFailed.as_str() && e.created_at >= since)
        {
            if let Some(user_id) = event.user_id {
                let entry = by_user.entry(user_id).or_default();
                entry.0 += 1;
                entry.1.insert(event.ip_address.clone());
            }
        }
        let mut rows: Vec<UserFailureCount> = by_user
            .into_iter()
            .filter(|(_, (count, _))| *count >= min_count)
            .map(|(user_id, (failures, ips))| UserFailureCount {
                user_id,
                failures,
                distinct_ips: ips.len() as i64,
            })
            .collect();
        rows.sort_by(|a, b| b.failures.cmp(&a.failures));
        Ok(rows)
    }

    async fn not_found_failures_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<IpFailureCount>, ServiceError> {
        let events = lock(&self.events)?;
        let mut by_ip: HashMap<String, i64> = HashMap::new();
        for event in events.iter().filter(|e| {
            e.action == AuditAction::LoginFailed.as_str()
                && e.created_at >= since
                && e.user_id.is_none()
                && e.details.get("reason").and_then(|r| r.as_str()) == Some("user_not_found")
        }) {
            *by_ip.entry(event.ip_address.clone()).or_default() += 1;
        }
        let mut rows: Vec<IpFailureCount> = by_ip
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .map(|(ip_address, failures)| IpFailureCount {
                ip_address,
                failures,
                distinct_users: 0,
            })
            .collect();
        rows.sort_by(|a, b| b.failures.cmp(&a.failures));
        Ok(rows)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut events = lock(&self.events)?;
        let before = events.len();
        events.retain(|e| e.created_at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

/// In-memory TTL counter for rate-limit tests.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: StdDuration) -> Result<u64, ServiceError> {
        let mut counters = lock(&self.counters)?;
        let now = Instant::now();
        let entry = counters.entry(key.to_string()).or_insert((0, now + window));
        if entry.1 <= now {
            // Window rolled; start a fresh one.
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}
