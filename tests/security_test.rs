mod common;

use auth_core::error::ServiceError;
use auth_core::models::{AuditAction, AuditEvent};
use auth_core::services::AbuseFinding;
use auth_core::store::AuditLogStore;
use auth_core::tasks;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

async fn append_failed_login(app: &TestApp, user_id: Option<Uuid>, ip: &str, reason: &str) {
    app.store
        .append(&AuditEvent::new(
            AuditAction::LoginFailed,
            user_id,
            ip,
            None,
            json!({ "reason": reason }),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn many_source_ips_flag_suspicious_activity() {
    let app = TestApp::spawn();
    let user = app.register_user("ips@x.com", "pw123456").await;

    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"] {
        append_failed_login(&app, Some(user.id), ip, "invalid_password").await;
    }

    let warning = app
        .security
        .detect_suspicious_activity(user.id, "10.0.0.4")
        .await
        .unwrap();
    assert_eq!(warning.as_deref(), Some("Multiple IP addresses detected"));
}

#[tokio::test]
async fn quiet_accounts_are_not_flagged() {
    let app = TestApp::spawn();
    let user = app.register_user("quiet@x.com", "pw123456").await;

    append_failed_login(&app, Some(user.id), "10.0.0.1", "invalid_password").await;

    let warning = app
        .security
        .detect_suspicious_activity(user.id, "10.0.0.1")
        .await
        .unwrap();
    assert!(warning.is_none());
}

#[tokio::test]
async fn sustained_failures_auto_lock_the_account() {
    let app = TestApp::spawn();
    let user = app.register_user("target@x.com", "pw123456").await;

    for i in 0..10 {
        append_failed_login(
            &app,
            Some(user.id),
            &format!("10.0.1.{}", i % 2),
            "invalid_password",
        )
        .await;
    }

    let findings = app.security.scan_for_abuse().await.unwrap();
    assert!(findings.iter().any(|f| matches!(
        f,
        AbuseFinding::UserUnderAttack { user_id, locked: true, .. } if *user_id == user.id
    )));

    // The lock holds against the correct password.
    let err = app
        .auth
        .authenticate_credentials("target@x.com", "pw123456", &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccountLocked { .. }));
}

#[tokio::test]
async fn enumeration_probes_are_reported() {
    let app = TestApp::spawn();

    for _ in 0..20 {
        append_failed_login(&app, None, "203.0.113.7", "user_not_found").await;
    }

    let findings = app.security.scan_for_abuse().await.unwrap();
    assert!(findings.iter().any(|f| matches!(
        f,
        AbuseFinding::AccountEnumeration { ip_address, attempts } if ip_address == "203.0.113.7" && *attempts == 20
    )));
}

#[tokio::test]
async fn brute_force_from_one_ip_is_reported() {
    let app = TestApp::spawn();
    let alice = app.register_user("a1@x.com", "pw123456").await;
    let bob = app.register_user("b1@x.com", "pw123456").await;

    for user in [alice.id, bob.id] {
        for _ in 0..5 {
            append_failed_login(&app, Some(user), "198.51.100.9", "invalid_password").await;
        }
    }

    let findings = app.security.scan_for_abuse().await.unwrap();
    assert!(findings.iter().any(|f| matches!(
        f,
        AbuseFinding::BruteForceIp { ip_address, failures, distinct_users }
            if ip_address == "198.51.100.9" && *failures == 10 && *distinct_users == 2
    )));
}

#[tokio::test]
async fn abuse_scan_task_alerts_administrators() {
    let app = TestApp::spawn();

    for _ in 0..20 {
        append_failed_login(&app, None, "203.0.113.8", "user_not_found").await;
    }

    let admins = vec!["ops@x.com".to_string()];
    let findings =
        tasks::scan_suspicious_activity(&app.security, app.mailer.as_ref(), &admins)
            .await
            .unwrap();
    assert!(!findings.is_empty());

    let sent = app.mailer.sent.lock().unwrap();
    assert!(sent
        .iter()
        .any(|m| m.to == "ops@x.com" && m.subject == "Suspicious Activity Detected"));
}

#[tokio::test]
async fn daily_report_aggregates_the_last_day() {
    let app = TestApp::spawn();
    app.register_user("rep@x.com", "pw123456").await;

    app.login("rep@x.com", "pw123456").await;
    let _ = app
        .auth
        .authenticate_credentials("rep@x.com", "wrong-pw", &app.ctx())
        .await;
    let _ = app
        .verification
        .create_password_reset("rep@x.com", &app.ctx())
        .await;

    let report = app.security.security_report().await.unwrap();
    assert_eq!(report.successful_logins, 1);
    assert_eq!(report.failed_logins, 1);
    assert_eq!(report.password_reset_requests, 1);
    assert_eq!(report.active_sessions, 1);
    assert!((report.success_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(report.top_failed_ips.len(), 1);
}

#[tokio::test]
async fn security_summary_reflects_user_state() {
    let app = TestApp::spawn();
    let user = app.register_user("sum@x.com", "pw123456").await;
    app.login("sum@x.com", "pw123456").await;
    app.login("sum@x.com", "pw123456").await;

    let user = auth_core::store::CredentialStore::find_by_id(app.store.as_ref(), user.id)
        .await
        .unwrap()
        .unwrap();
    let summary = app.security.security_summary(&user).await.unwrap();

    assert_eq!(summary.active_sessions, 2);
    assert_eq!(summary.failed_attempts, 0);
    assert!(!summary.is_locked);
    assert_eq!(summary.recent_logins, 2);
}
