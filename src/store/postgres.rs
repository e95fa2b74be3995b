//! PostgreSQL implementations of the repository traits.
//!
//! Plain-SQL queries over a shared pool. Counter updates that race under
//! concurrent logins are single statements so the database serializes them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{
    AuditAction, AuditEvent, AuthUser, EphemeralToken, IpFailureCount, Session, TokenPurpose,
    UserFailureCount,
};
use crate::store::{
    AuditLogStore, CredentialStore, EphemeralTokenStore, LoginFailure, SessionStore,
};

/// PostgreSQL database wrapper implementing every repository trait.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn insert_user(&self, user: &AuthUser) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO auth_users (id, email, password_hash, is_active, is_verified,
                failed_attempts, locked_until, password_changed_at, last_login, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.failed_attempts)
        .bind(user.locked_until)
        .bind(user.password_changed_at)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>, ServiceError> {
        let user = sqlx::query_as::<_, AuthUser>("SELECT * FROM auth_users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<AuthUser>, ServiceError> {
        let user = sqlx::query_as::<_, AuthUser>("SELECT * FROM auth_users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn record_login_success(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE auth_users
            SET failed_attempts = 0, locked_until = NULL, last_login = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: Uuid,
        lock_threshold: i32,
        lock_duration: Duration,
    ) -> Result<LoginFailure, ServiceError> {
        // Increment and threshold check in one statement; concurrent failures
        // serialize on the row and the attempt that reaches the threshold
        // always sets the lock.
        let row: (i32, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            UPDATE auth_users
            SET failed_attempts = failed_attempts + 1,
                locked_until = CASE
                    WHEN failed_attempts + 1 >= $2
                    THEN NOW() + make_interval(secs => $3)
                    ELSE locked_until
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_attempts, locked_until
            "#,
        )
        .bind(user_id)
        .bind(lock_threshold)
        .bind(lock_duration.num_seconds() as f64)
        .fetch_one(&self.pool)
        .await?;

        Ok(LoginFailure {
            failed_attempts: row.0,
            locked_until: row.1,
        })
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE auth_users
            SET password_hash = $2, password_changed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_verified(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE auth_users SET is_verified = true, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lock_until(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<(), ServiceError> {
        sqlx::query("UPDATE auth_users SET locked_until = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(until)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_locked(&self, now: DateTime<Utc>) -> Result<i64, ServiceError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM auth_users WHERE locked_until > $1")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn insert(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions (id, user_id, session_token, refresh_token, device_id,
                device_type, device_name, ip_address, user_agent, status, created_at,
                last_accessed, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.session_token)
        .bind(&session.refresh_token)
        .bind(&session.device_id)
        .bind(&session.device_type)
        .bind(&session.device_name)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.status)
        .bind(session.created_at)
        .bind(session.last_accessed)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn find_active_by_session_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM user_sessions WHERE session_token = $1 AND status = 'active'",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_active_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM user_sessions WHERE refresh_token = $1 AND status = 'active'",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND status = 'active' AND expires_at > NOW()
            ORDER BY last_accessed DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn touch(&self, session_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE user_sessions SET last_accessed = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rotate_tokens(
        &self,
        session_id: Uuid,
        session_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET session_token = $2, refresh_token = $3, expires_at = $4, last_accessed = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(session_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_expired(&self, session_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE user_sessions SET status = 'expired' WHERE id = $1 AND status = 'active'",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET status = 'revoked' WHERE id = $1 AND status = 'active'",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET status = 'revoked'
            WHERE user_id = $1 AND status = 'active' AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expire_overdue_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET status = 'expired'
            WHERE user_id = $1 AND status = 'active' AND expires_at < $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET status = 'expired' WHERE status = 'active' AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_active(&self) -> Result<i64, ServiceError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_sessions WHERE status = 'active' AND expires_at > NOW()",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl EphemeralTokenStore for Database {
    async fn insert_superseding(&self, token: &EphemeralToken) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE ephemeral_tokens
            SET is_used = true
            WHERE user_id = $1 AND purpose = $2 AND is_used = false
            "#,
        )
        .bind(token.user_id)
        .bind(&token.purpose)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ephemeral_tokens (id, user_id, purpose, token, created_at, expires_at, is_used)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.purpose)
        .bind(&token.token)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.is_used)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<EphemeralToken>, ServiceError> {
        let record = sqlx::query_as::<_, EphemeralToken>(
            "SELECT * FROM ephemeral_tokens WHERE purpose = $1 AND token = $2",
        )
        .bind(purpose.as_str())
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn mark_used(&self, token_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE ephemeral_tokens SET is_used = true WHERE id = $1 AND is_used = false",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM ephemeral_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditLogStore for Database {
    async fn append(&self, event: &AuditEvent) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, user_id, action, ip_address, user_agent, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.action)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AuditEvent>, ServiceError> {
        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT * FROM audit_events
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn count_since(
        &self,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM audit_events WHERE action = $1 AND created_at >= $2",
        )
        .bind(action.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn failed_logins_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<IpFailureCount>, ServiceError> {
        let rows = sqlx::query_as::<_, IpFailureCount>(
            r#"
            SELECT ip_address, COUNT(*) AS failures, COUNT(DISTINCT user_id) AS distinct_users
            FROM audit_events
            WHERE action = 'login_failed' AND created_at >= $1
            GROUP BY ip_address
            HAVING COUNT(*) >= $2
            ORDER BY failures DESC
            "#,
        )
        .bind(since)
        .bind(min_count)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn failed_logins_by_user(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<UserFailureCount>, ServiceError> {
        let rows = sqlx::query_as::<_, UserFailureCount>(
            r#"
            SELECT user_id, COUNT(*) AS failures, COUNT(DISTINCT ip_address) AS distinct_ips
            FROM audit_events
            WHERE action = 'login_failed' AND created_at >= $1 AND user_id IS NOT NULL
            GROUP BY user_id
            HAVING COUNT(*) >= $2
            ORDER BY failures DESC
            "#,
        )
        .bind(since)
        .bind(min_count)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn not_found_failures_by_ip(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<IpFailureCount>, ServiceError> {
        let rows = sqlx::query_as::<_, IpFailureCount>(
            r#"
            SELECT ip_address, COUNT(*) AS failures, 0::bigint AS distinct_users
            FROM audit_events
            WHERE action = 'login_failed'
              AND created_at >= $1
              AND user_id IS NULL
              AND details->>'reason' = 'user_not_found'
            GROUP BY ip_address
            HAVING COUNT(*) >= $2
            ORDER BY failures DESC
            "#,
        )
        .bind(since)
        .bind(min_count)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM audit_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
