//! Suspicious-activity heuristics and periodic security reporting over the
//! audit log.
//!
//! Request-path detection is advisory; the heavier aggregations run as
//! scheduled jobs. Thresholds come from configuration, not hard-coded.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SecurityThresholds;
use crate::error::ServiceError;
use crate::models::{AuditAction, AuditEvent, AuthUser, IpFailureCount};
use crate::store::{AuditLogStore, CredentialStore, SessionStore};

/// Finding from the periodic abuse scan.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbuseFinding {
    /// Failed logins concentrated on one account.
    UserUnderAttack {
        user_id: Uuid,
        failures: i64,
        distinct_ips: i64,
        locked: bool,
    },
    /// Failed logins concentrated on one source IP.
    BruteForceIp {
        ip_address: String,
        failures: i64,
        distinct_users: i64,
    },
    /// Lookups of non-existent accounts from one source IP.
    AccountEnumeration { ip_address: String, attempts: i64 },
}

/// Daily aggregate over the trailing 24 hours.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub successful_logins: i64,
    pub failed_logins: i64,
    pub password_reset_requests: i64,
    pub locked_accounts: i64,
    pub active_sessions: i64,
    pub success_rate: f64,
    pub top_failed_ips: Vec<IpFailureCount>,
    pub generated_at: DateTime<Utc>,
}

/// Per-user security posture, for profile endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UserSecuritySummary {
    pub active_sessions: usize,
    pub failed_attempts: i32,
    pub is_locked: bool,
    pub is_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
    pub recent_logins: usize,
}

#[derive(Clone)]
pub struct SecurityService {
    audit: Arc<dyn AuditLogStore>,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn CredentialStore>,
    thresholds: SecurityThresholds,
}

impl SecurityService {
    pub fn new(
        audit: Arc<dyn AuditLogStore>,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn CredentialStore>,
        thresholds: SecurityThresholds,
    ) -> Self {
        Self {
            audit,
            sessions,
            users,
            thresholds,
        }
    }

    fn is_login_attempt(event: &AuditEvent) -> bool {
        event.action == AuditAction::LoginSuccess.as_str()
            || event.action == AuditAction::LoginFailed.as_str()
    }

    /// Advisory check over the user's trailing hour of audit events. Returns
    /// a human-readable reason when the pattern looks off; attached as a
    /// warning, never a block.
    pub async fn detect_suspicious_activity(
        &self,
        user_id: Uuid,
        _ip_address: &str,
    ) -> Result<Option<String>, ServiceError> {
        let since = Utc::now() - Duration::hours(1);
        let events = self
            .audit
            .events_for_user_since(user_id, since, 50)
            .await?;

        let distinct_ips: HashSet<&str> =
            events.iter().map(|e| e.ip_address.as_str()).collect();
        if distinct_ips.len() > self.thresholds.suspicious_distinct_ips {
            return Ok(Some("Multiple IP addresses detected".to_string()));
        }

        let login_attempts = events.iter().filter(|e| Self::is_login_attempt(e)).count();
        if login_attempts >= self.thresholds.suspicious_login_attempts {
            return Ok(Some("Rapid login attempts detected".to_string()));
        }

        Ok(None)
    }

    /// Periodic scan over the trailing hour. Accounts drawing at least the
    /// auto-lock quota of failures get locked for the configured duration;
    /// per-IP brute force and enumeration probes are reported for alerting.
    pub async fn scan_for_abuse(&self) -> Result<Vec<AbuseFinding>, ServiceError> {
        let since = Utc::now() - Duration::hours(1);
        let mut findings = Vec::new();

        let by_user = self
            .audit
            .failed_logins_by_user(since, self.thresholds.user_failure_alert)
            .await?;
        for target in by_user {
            let locked = target.failures >= self.thresholds.auto_lock_failures;
            if locked {
                let until = Utc::now() + Duration::minutes(self.thresholds.auto_lock_minutes);
                self.users.lock_until(target.user_id, until).await?;
                self.audit
                    .append(&AuditEvent::new(
                        AuditAction::AccountLocked,
                        Some(target.user_id),
                        "system",
                        None,
                        serde_json::json!({
                            "reason": "auto_lock",
                            "failures": target.failures,
                        }),
                    ))
                    .await?;
                tracing::warn!(user_id = %target.user_id, failures = target.failures,
                    "Auto-locked account under sustained failed logins");
            }
            findings.push(AbuseFinding::UserUnderAttack {
                user_id: target.user_id,
                failures: target.failures,
                distinct_ips: target.distinct_ips,
                locked,
            });
        }

        let by_ip = self
            .audit
            .failed_logins_by_ip(since, self.thresholds.ip_failure_alert)
            .await?;
        for source in by_ip {
            findings.push(AbuseFinding::BruteForceIp {
                ip_address: source.ip_address,
                failures: source.failures,
                distinct_users: source.distinct_users,
            });
        }

        let enumeration = self
            .audit
            .not_found_failures_by_ip(since, self.thresholds.enumeration_alert)
            .await?;
        for source in enumeration {
            findings.push(AbuseFinding::AccountEnumeration {
                ip_address: source.ip_address,
                attempts: source.failures,
            });
        }

        if !findings.is_empty() {
            tracing::warn!(count = findings.len(), "Abuse scan produced findings");
        }
        Ok(findings)
    }

    /// Aggregate the trailing 24 hours into the daily report.
    pub async fn security_report(&self) -> Result<SecurityReport, ServiceError> {
        let now = Utc::now();
        let since = now - Duration::hours(24);

        let successful_logins = self
            .audit
            .count_since(AuditAction::LoginSuccess, since)
            .await?;
        let failed_logins = self.audit.count_since(AuditAction::LoginFailed, since).await?;
        let password_reset_requests = self
            .audit
            .count_since(AuditAction::PasswordResetRequested, since)
            .await?;
        let locked_accounts = self.users.count_locked(now).await?;
        let active_sessions = self.sessions.count_active().await?;

        let total_attempts = successful_logins + failed_logins;
        let success_rate = if total_attempts > 0 {
            successful_logins as f64 / total_attempts as f64 * 100.0
        } else {
            100.0
        };

        let top_failed_ips = self.audit.failed_logins_by_ip(since, 1).await?;

        Ok(SecurityReport {
            successful_logins,
            failed_logins,
            password_reset_requests,
            locked_accounts,
            active_sessions,
            success_rate,
            top_failed_ips,
            generated_at: now,
        })
    }

    /// Per-user posture summary.
    pub async fn security_summary(
        &self,
        user: &AuthUser,
    ) -> Result<UserSecuritySummary, ServiceError> {
        let active_sessions = self.sessions.list_active_for_user(user.id).await?.len();

        let month_ago = Utc::now() - Duration::days(30);
        let recent_logins = self
            .audit
            .events_for_user_since(user.id, month_ago, 500)
            .await?
            .iter()
            .filter(|e| e.action == AuditAction::LoginSuccess.as_str())
            .count();

        Ok(UserSecuritySummary {
            active_sessions,
            failed_attempts: user.failed_attempts,
            is_locked: user.is_locked(),
            is_verified: user.is_verified,
            last_login: user.last_login,
            password_changed_at: user.password_changed_at,
            recent_logins,
        })
    }
}
