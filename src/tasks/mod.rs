//! Deferred jobs: cleanup sweeps, abuse scans, report generation and email
//! dispatch.
//!
//! Each entry point is idempotent and independently retryable; an external
//! scheduler invokes them (hourly session sweep, daily pruning and report).
//! They are safe to run concurrently with live traffic and safe to re-run if
//! interrupted, since every mutation keys off a time cutoff.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration as StdDuration;
use tokio::time::sleep;

use crate::error::ServiceError;
use crate::services::email::EmailProvider;
use crate::services::security::{AbuseFinding, SecurityReport, SecurityService};
use crate::store::{AuditLogStore, EphemeralTokenStore, SessionStore};

/// Retry schedule for outbound email.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: StdDuration,
    pub max_backoff: StdDuration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: StdDuration::from_secs(1),
            max_backoff: StdDuration::from_secs(60),
        }
    }
}

impl RetryConfig {
    fn backoff_duration(&self, attempt: u32) -> StdDuration {
        let backoff = self.initial_backoff.as_millis() as u64 * 2u64.saturating_pow(attempt);
        StdDuration::from_millis(backoff).min(self.max_backoff)
    }
}

async fn send_with_retry<F, Fut>(
    config: RetryConfig,
    operation: &str,
    f: F,
) -> Result<(), ServiceError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), ServiceError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(operation = operation, attempt = attempt + 1,
                        "Send succeeded after retry");
                }
                return Ok(());
            }
            Err(e) if attempt < config.max_retries => {
                let backoff = config.backoff_duration(attempt);
                tracing::warn!(operation = operation, attempt = attempt + 1, error = %e,
                    backoff_ms = backoff.as_millis() as u64, "Send failed, retrying");
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(operation = operation, error = %e,
                    "Send failed after max retries");
                return Err(e);
            }
        }
    }
}

/// Result of the hourly session sweep.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionCleanup {
    pub expired: u64,
    pub purged: u64,
}

/// Flip overdue active sessions to expired and drop sessions past the
/// retention horizon.
pub async fn cleanup_expired_sessions(
    sessions: &dyn SessionStore,
    retention_days: i64,
) -> Result<SessionCleanup, ServiceError> {
    let now = Utc::now();
    let expired = sessions.expire_overdue(now).await?;
    let purged = sessions
        .purge_created_before(now - Duration::days(retention_days))
        .await?;

    tracing::info!(expired = expired, purged = purged, "Session cleanup completed");
    Ok(SessionCleanup { expired, purged })
}

/// Drop expired verification and reset tokens.
pub async fn cleanup_expired_tokens(
    tokens: &dyn EphemeralTokenStore,
) -> Result<u64, ServiceError> {
    let purged = tokens.purge_expired(Utc::now()).await?;
    tracing::info!(purged = purged, "Token cleanup completed");
    Ok(purged)
}

/// Prune audit events past the retention horizon.
pub async fn cleanup_audit_log(
    audit: &dyn AuditLogStore,
    retention_days: i64,
) -> Result<u64, ServiceError> {
    let pruned = audit
        .prune_before(Utc::now() - Duration::days(retention_days))
        .await?;
    tracing::info!(pruned = pruned, "Audit log cleanup completed");
    Ok(pruned)
}

pub async fn send_verification_email(
    mailer: &dyn EmailProvider,
    to_email: &str,
    token: &str,
    base_url: &str,
    retry: RetryConfig,
) -> Result<(), ServiceError> {
    send_with_retry(retry, "send_verification_email", || {
        mailer.send_verification_email(to_email, token, base_url)
    })
    .await
}

pub async fn send_password_reset_email(
    mailer: &dyn EmailProvider,
    to_email: &str,
    token: &str,
    base_url: &str,
    retry: RetryConfig,
) -> Result<(), ServiceError> {
    send_with_retry(retry, "send_password_reset_email", || {
        mailer.send_password_reset_email(to_email, token, base_url)
    })
    .await
}

pub async fn send_security_alert(
    mailer: &dyn EmailProvider,
    recipients: &[String],
    subject: &str,
    body: &str,
    retry: RetryConfig,
) -> Result<(), ServiceError> {
    for recipient in recipients {
        send_with_retry(retry, "send_security_alert", || {
            mailer.send_security_alert(recipient, subject, body)
        })
        .await?;
    }
    Ok(())
}

/// Run the abuse scan and alert administrators when it finds anything.
pub async fn scan_suspicious_activity(
    security: &SecurityService,
    mailer: &dyn EmailProvider,
    admin_emails: &[String],
) -> Result<Vec<AbuseFinding>, ServiceError> {
    let findings = security.scan_for_abuse().await?;

    if !findings.is_empty() && !admin_emails.is_empty() {
        let body = serde_json::to_string_pretty(&findings)
            .unwrap_or_else(|_| format!("{} findings (serialization failed)", findings.len()));
        send_security_alert(
            mailer,
            admin_emails,
            "Suspicious Activity Detected",
            &body,
            RetryConfig::default(),
        )
        .await?;
    }

    Ok(findings)
}

/// Build the daily report; alert administrators when failed logins pass the
/// given threshold.
pub async fn generate_security_report(
    security: &SecurityService,
    mailer: &dyn EmailProvider,
    admin_emails: &[String],
    failed_login_alert_threshold: i64,
) -> Result<SecurityReport, ServiceError> {
    let report = security.security_report().await?;

    if report.failed_logins > failed_login_alert_threshold && !admin_emails.is_empty() {
        let body = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|_| "report serialization failed".to_string());
        send_security_alert(
            mailer,
            admin_emails,
            "Security Alert: High Failed Login Activity",
            &body,
            RetryConfig::default(),
        )
        .await?;
    }

    Ok(report)
}
