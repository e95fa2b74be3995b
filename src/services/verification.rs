//! Email verification and password reset workflows.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{AuditAction, AuditEvent, AuthUser, EphemeralToken, TokenPurpose};
use crate::services::auth::RequestContext;
use crate::store::{AuditLogStore, CredentialStore, EphemeralTokenStore, SessionStore};
use crate::utils::{generate_token, hash_password, normalize_email};

#[derive(Clone)]
pub struct VerificationService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn EphemeralTokenStore>,
    audit: Arc<dyn AuditLogStore>,
}

impl VerificationService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<dyn EphemeralTokenStore>,
        audit: Arc<dyn AuditLogStore>,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            audit,
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

    /// Issue a fresh email-verification token, superseding any unused one.
    pub async fn create_email_verification(&self, user: &AuthUser) -> Result<String, ServiceError> {
        let token = generate_token();
        let record = EphemeralToken::new(user.id, TokenPurpose::EmailVerification, token.clone());
        self.tokens.insert_superseding(&record).await?;
        Ok(token)
    }

    /// Confirm an email address. Invalid, expired and already-used tokens are
    /// indistinguishable to the caller.
    pub async fn verify_email(&self, token: &str, ctx: &RequestContext) -> Result<(), ServiceError> {
        let record = self
            .tokens
            .find_by_token(TokenPurpose::EmailVerification, token)
            .await?
            .filter(|t| t.is_valid())
            .ok_or(ServiceError::InvalidToken)?;

        if !self.tokens.mark_used(record.id).await? {
            // Lost the race with a concurrent confirmation.
            return Err(ServiceError::InvalidToken);
        }

        self.users.set_verified(record.user_id).await?;
        self.audit_event(AuditAction::EmailVerified, Some(record.user_id), ctx, json!({}))
            .await?;

        tracing::info!(user_id = %record.user_id, "Email verified");
        Ok(())
    }

    /// Issue a password-reset token. An unknown or inactive email is absorbed
    /// (`Ok(None)`) so the boundary can answer "accepted" either way.
    pub async fn create_password_reset(
        &self,
        email: &str,
        ctx: &RequestContext,
    ) -> Result<Option<String>, ServiceError> {
        let email = normalize_email(email);

        let Some(user) = self
            .users
            .find_by_email(&email)
            .await?
            .filter(|u| u.is_active)
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(None);
        };

        let token = generate_token();
        let record = EphemeralToken::new(user.id, TokenPurpose::PasswordReset, token.clone());
        self.tokens.insert_superseding(&record).await?;

        self.audit_event(
            AuditAction::PasswordResetRequested,
            Some(user.id),
            ctx,
            json!({}),
        )
        .await?;

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(Some(token))
    }

    /// Complete a password reset: single-use token, new hash (which bumps
    /// `password_changed_at` and thus kills outstanding access tokens), and
    /// revocation of every active session so all devices re-authenticate.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let record = self
            .tokens
            .find_by_token(TokenPurpose::PasswordReset, token)
            .await?
            .filter(|t| t.is_valid())
            .ok_or(ServiceError::InvalidToken)?;

        if !self.tokens.mark_used(record.id).await? {
            return Err(ServiceError::InvalidToken);
        }

        let new_hash = hash_password(new_password)?;
        self.users.update_password(record.user_id, &new_hash).await?;

        let revoked = self
            .sessions
            .revoke_all_for_user(record.user_id, None)
            .await?;

        self.audit_event(
            AuditAction::PasswordResetCompleted,
            Some(record.user_id),
            ctx,
            json!({ "revoked_sessions": revoked }),
        )
        .await?;

        tracing::info!(user_id = %record.user_id, revoked = revoked, "Password reset completed");
        Ok(())
    }
}
