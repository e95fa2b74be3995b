//! Authentication engine: credential checks, session issuance, token
//! minting/validation, refresh, logout and password changes.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::ServiceError;
use crate::models::{
    AuditAction, AuditEvent, AuthUser, DeviceInfo, Session, SessionInfo, SessionStatus,
    UserSummary,
};
use crate::services::directory::{OrgDirectory, OrgInfo};
use crate::services::jwt::{AccessClaims, JwtService};
use crate::services::security::SecurityService;
use crate::store::{AuditLogStore, CredentialStore, SessionStore};
use crate::utils::{generate_token_pair, hash_password, normalize_email, verify_password};

/// Caller context passed explicitly into every engine call; the boundary
/// extracts it from the request, the engine never reads ambient state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent,
        }
    }
}

/// Lockout and session lifetime policy.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    pub lock_threshold: i32,
    pub lock_duration: Duration,
    pub session_ttl: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            lock_threshold: 5,
            lock_duration: Duration::minutes(30),
            session_ttl: Duration::hours(24),
        }
    }
}

impl AuthPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            lock_threshold: config.lockout.max_failed_attempts,
            lock_duration: Duration::minutes(config.lockout.lock_minutes),
            session_ttl: Duration::hours(config.session.ttl_hours),
        }
    }
}

/// Successful login payload for the boundary.
#[derive(Debug, Serialize)]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub expires_in: i64,
    pub user: UserSummary,
    pub org_id: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_warning: Option<String>,
}

/// Successful refresh payload: the rotated pair plus a fresh access token.
#[derive(Debug, Serialize)]
pub struct RefreshGrant {
    pub access_token: String,
    pub session_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditLogStore>,
    directory: Arc<dyn OrgDirectory>,
    jwt: JwtService,
    security: SecurityService,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditLogStore>,
        directory: Arc<dyn OrgDirectory>,
        jwt: JwtService,
        security: SecurityService,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            audit,
            directory,
            jwt,
            security,
            policy,
        }
    }

    async fn audit_event(
        &self,
        action: AuditAction,
        user_id: Option<Uuid>,
        ctx: &RequestContext,
        details: serde_json::Value,
    ) -> Result<(), ServiceError> {
        self.audit
            .append(&AuditEvent::new(
                action,
                user_id,
                ctx.ip_address.clone(),
                ctx.user_agent.clone(),
                details,
            ))
            .await
    }

    /// Verify email/password against the credential store.
    ///
    /// An unknown email and a wrong password both come back as
    /// `InvalidCredentials`; only the audit log records which it was.
    pub async fn authenticate_credentials(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<AuthUser, ServiceError> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.audit_event(
                AuditAction::LoginFailed,
                None,
                ctx,
                json!({ "reason": "user_not_found", "email": email }),
            )
            .await?;
            return Err(ServiceError::InvalidCredentials);
        };

        if user.is_locked() {
            self.audit_event(
                AuditAction::LoginFailed,
                Some(user.id),
                ctx,
                json!({ "reason": "account_locked" }),
            )
            .await?;
            return Err(ServiceError::AccountLocked {
                until: user.locked_until.unwrap_or_else(Utc::now),
            });
        }

        if !user.is_active {
            self.audit_event(
                AuditAction::LoginFailed,
                Some(user.id),
                ctx,
                json!({ "reason": "account_inactive" }),
            )
            .await?;
            return Err(ServiceError::AccountInactive);
        }

        if verify_password(password, &user.password_hash)? {
            self.users.record_login_success(user.id).await?;
            self.audit_event(AuditAction::LoginSuccess, Some(user.id), ctx, json!({}))
                .await?;

            tracing::info!(user_id = %user.id, "Login successful");

            let mut user = user;
            user.failed_attempts = 0;
            user.locked_until = None;
            user.last_login = Some(Utc::now());
            Ok(user)
        } else {
            let failure = self
                .users
                .record_login_failure(user.id, self.policy.lock_threshold, self.policy.lock_duration)
                .await?;

            self.audit_event(
                AuditAction::LoginFailed,
                Some(user.id),
                ctx,
                json!({
                    "reason": "invalid_password",
                    "failed_attempts": failure.failed_attempts,
                }),
            )
            .await?;

            if failure.failed_attempts == self.policy.lock_threshold {
                tracing::warn!(user_id = %user.id, "Account locked after repeated failures");
                self.audit_event(
                    AuditAction::AccountLocked,
                    Some(user.id),
                    ctx,
                    json!({ "failed_attempts": failure.failed_attempts }),
                )
                .await?;
            }

            Err(ServiceError::InvalidCredentials)
        }
    }

    /// Create a fresh session for an authenticated user, lazily expiring any
    /// of their sessions that ran out in the meantime.
    pub async fn issue_session(
        &self,
        user: &AuthUser,
        device: DeviceInfo,
        ctx: &RequestContext,
    ) -> Result<Session, ServiceError> {
        self.sessions
            .expire_overdue_for_user(user.id, Utc::now())
            .await?;

        let (session_token, refresh_token) = generate_token_pair();
        let session = Session::new(
            user.id,
            session_token,
            refresh_token,
            device,
            ctx.ip_address.clone(),
            ctx.user_agent.clone(),
            self.policy.session_ttl,
        );
        self.sessions.insert(&session).await?;

        Ok(session)
    }

    /// Mint an access token for a session with its org binding.
    pub fn mint_access_token(
        &self,
        session: &Session,
        user: &AuthUser,
        org: &OrgInfo,
    ) -> Result<String, ServiceError> {
        self.jwt.mint(session, user, org)
    }

    /// Full login flow: credentials, advisory suspicious-activity check,
    /// directory lookup, session issuance, token mint.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: DeviceInfo,
        ctx: &RequestContext,
    ) -> Result<LoginGrant, ServiceError> {
        let user = self.authenticate_credentials(email, password, ctx).await?;

        // Advisory only; a detection failure must never block the login.
        let security_warning = match self
            .security
            .detect_suspicious_activity(user.id, &ctx.ip_address)
            .await
        {
            Ok(warning) => warning,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Suspicious-activity check failed");
                None
            }
        };

        let org = self.directory.user_org_info(&user.email).await?;
        let session = self.issue_session(&user, device, ctx).await?;
        let access_token = self.mint_access_token(&session, &user, &org)?;

        Ok(LoginGrant {
            access_token,
            refresh_token: session.refresh_token.clone(),
            session_id: session.id,
            expires_in: self.jwt.access_token_expiry_seconds(),
            user: user.sanitized(),
            org_id: org.org_id,
            role: org.role,
            security_warning,
        })
    }

    /// Validate a bearer token: signature and expiry, then the referenced
    /// session (which must still be live), then password-change freshness.
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessClaims, ServiceError> {
        let claims = self.jwt.decode(token)?;

        let session = self
            .sessions
            .find_by_id(claims.session_id)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        if session.status != SessionStatus::Active.as_str() {
            return Err(ServiceError::SessionNotFound);
        }
        if session.is_expired() {
            self.sessions.mark_expired(session.id).await?;
            return Err(ServiceError::SessionExpired);
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        // A newer password_changed_at means the password changed after this
        // token was minted; the snapshot check is the only way to revoke
        // already-issued JWTs.
        if user.password_epoch() > claims.password_changed_at {
            return Err(ServiceError::TokenInvalidatedByPasswordChange);
        }

        self.sessions.touch(session.id).await?;
        Ok(claims)
    }

    /// Rotate a session's token pair and mint a fresh access token.
    ///
    /// The directory is consulted before anything is persisted, so a
    /// directory failure leaves the stored pair untouched and the caller can
    /// retry with the same refresh token.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        _ctx: &RequestContext,
    ) -> Result<RefreshGrant, ServiceError> {
        let session = self
            .sessions
            .find_active_by_refresh_token(refresh_token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if session.is_expired() {
            self.sessions.mark_expired(session.id).await?;
            return Err(ServiceError::SessionExpired);
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let org = self.directory.user_org_info(&user.email).await?;

        let (new_session_token, new_refresh_token) = generate_token_pair();
        let expires_at = Utc::now() + self.policy.session_ttl;

        let rotated = self
            .sessions
            .rotate_tokens(session.id, &new_session_token, &new_refresh_token, expires_at)
            .await?;
        if !rotated {
            // Revoked between lookup and rotation; the revocation wins.
            return Err(ServiceError::SessionNotFound);
        }

        let mut session = session;
        session.session_token = new_session_token;
        session.refresh_token = new_refresh_token;
        session.expires_at = expires_at;

        let access_token = self.mint_access_token(&session, &user, &org)?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "Session refreshed");

        Ok(RefreshGrant {
            access_token,
            session_token: session.session_token.clone(),
            refresh_token: session.refresh_token.clone(),
            session_id: session.id,
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Revoke the session identified by its opaque session token.
    pub async fn logout(
        &self,
        session_token: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let session = self
            .sessions
            .find_active_by_session_token(session_token)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        if !self.sessions.revoke(session.id).await? {
            return Err(ServiceError::SessionNotFound);
        }

        self.audit_event(
            AuditAction::Logout,
            Some(session.user_id),
            ctx,
            json!({
                "session_id": session.id,
                "device_type": session.device_type,
            }),
        )
        .await?;

        tracing::info!(user_id = %session.user_id, session_id = %session.id, "Logged out");
        Ok(())
    }

    /// Revoke every active session of a user; returns the count revoked.
    pub async fn logout_all(
        &self,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        let revoked = self.sessions.revoke_all_for_user(user_id, None).await?;

        self.audit_event(
            AuditAction::LogoutAll,
            Some(user_id),
            ctx,
            json!({ "revoked_sessions": revoked }),
        )
        .await?;

        tracing::info!(user_id = %user_id, revoked = revoked, "Logged out of all devices");
        Ok(revoked)
    }

    /// Change a password with the current one as proof. Bumping
    /// `password_changed_at` invalidates every access token minted before
    /// this call; `revoke_others` additionally revokes all sessions except
    /// the caller's current one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_session_id: Option<Uuid>,
        current_password: &str,
        new_password: &str,
        revoke_others: bool,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(ServiceError::InvalidCredentials);
        }
        if current_password == new_password {
            return Err(ServiceError::ValidationFailed(
                "new password must differ from the current password".to_string(),
            ));
        }

        let new_hash = hash_password(new_password)?;
        self.users.update_password(user.id, &new_hash).await?;

        let revoked = if revoke_others {
            self.sessions
                .revoke_all_for_user(user.id, current_session_id)
                .await?
        } else {
            0
        };

        self.audit_event(
            AuditAction::PasswordChanged,
            Some(user.id),
            ctx,
            json!({ "revoked_sessions": revoked }),
        )
        .await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(revoked)
    }

    /// Active sessions for a user, with the caller's current one flagged.
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        current_session_id: Option<Uuid>,
    ) -> Result<Vec<SessionInfo>, ServiceError> {
        let sessions = self.sessions.list_active_for_user(user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|s| {
                let id = s.id;
                let mut info = SessionInfo::from(s);
                info.is_current = current_session_id == Some(id);
                info
            })
            .collect())
    }

    /// Revoke one of the caller's own sessions by id.
    pub async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(ServiceError::SessionNotFound)?;

        if !self.sessions.revoke(session.id).await? {
            return Err(ServiceError::SessionNotFound);
        }

        self.audit_event(
            AuditAction::SessionRevoked,
            Some(user_id),
            ctx,
            json!({ "session_id": session.id }),
        )
        .await?;

        Ok(())
    }

    /// Expiry timestamp helper for boundary responses.
    pub fn session_expiry_from_now(&self) -> DateTime<Utc> {
        Utc::now() + self.policy.session_ttl
    }
}
