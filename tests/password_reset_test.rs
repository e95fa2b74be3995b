mod common;

use auth_core::error::ServiceError;
use auth_core::models::{EphemeralToken, TokenPurpose};
use auth_core::store::{CredentialStore, EphemeralTokenStore};
use chrono::{Duration, Utc};
use common::TestApp;

#[tokio::test]
async fn reset_revokes_all_sessions_and_tokens_are_single_use() {
    let app = TestApp::spawn();
    let user = app.register_user("c@x.com", "pw123456").await;

    let phone = app.login("c@x.com", "pw123456").await;
    let laptop = app.login("c@x.com", "pw123456").await;

    let token = app
        .verification
        .create_password_reset("c@x.com", &app.ctx())
        .await
        .unwrap()
        .expect("known email should yield a token");

    app.verification
        .reset_password(&token, "new-pw-456789", &app.ctx())
        .await
        .unwrap();

    // Every prior session is revoked: forced re-login everywhere.
    let sessions = app.auth.list_sessions(user.id, None).await.unwrap();
    assert!(sessions.is_empty());
    for grant in [&phone, &laptop] {
        let err = app
            .auth
            .validate_access_token(&grant.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SessionNotFound));
    }

    // Reusing the consumed token fails.
    let err = app
        .verification
        .reset_password(&token, "another-pw-789", &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    // Old password is gone, new one works.
    let err = app
        .auth
        .authenticate_credentials("c@x.com", "pw123456", &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));
    app.login("c@x.com", "new-pw-456789").await;
}

#[tokio::test]
async fn newest_reset_token_supersedes_prior_ones() {
    let app = TestApp::spawn();
    app.register_user("s@x.com", "pw123456").await;

    let first = app
        .verification
        .create_password_reset("s@x.com", &app.ctx())
        .await
        .unwrap()
        .unwrap();
    let second = app
        .verification
        .create_password_reset("s@x.com", &app.ctx())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(first, second);

    let err = app
        .verification
        .reset_password(&first, "new-pw-456789", &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    app.verification
        .reset_password(&second, "new-pw-456789", &app.ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_email_is_absorbed() {
    let app = TestApp::spawn();

    let outcome = app
        .verification
        .create_password_reset("ghost@x.com", &app.ctx())
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn expired_reset_token_is_rejected() {
    let app = TestApp::spawn();
    let user = app.register_user("exp@x.com", "pw123456").await;

    let mut record = EphemeralToken::new(
        user.id,
        TokenPurpose::PasswordReset,
        "expired-reset-token".to_string(),
    );
    record.expires_at = Utc::now() - Duration::minutes(1);
    app.store.insert_superseding(&record).await.unwrap();

    let err = app
        .verification
        .reset_password("expired-reset-token", "new-pw-456789", &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));
}

#[tokio::test]
async fn email_verification_round_trip() {
    let app = TestApp::spawn();
    let user = app.register_user("v@x.com", "pw123456").await;
    assert!(!user.is_verified);

    let token = app
        .verification
        .create_email_verification(&user)
        .await
        .unwrap();

    app.verification.verify_email(&token, &app.ctx()).await.unwrap();

    let stored = CredentialStore::find_by_id(app.store.as_ref(), user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_verified);

    // Single use: a second confirmation is indistinguishable from a bad token.
    let err = app
        .verification
        .verify_email(&token, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));
}

#[tokio::test]
async fn verification_and_reset_tokens_do_not_cross_purposes() {
    let app = TestApp::spawn();
    let user = app.register_user("cross@x.com", "pw123456").await;

    let verify_token = app
        .verification
        .create_email_verification(&user)
        .await
        .unwrap();

    // A verification token is not accepted as a reset token.
    let err = app
        .verification
        .reset_password(&verify_token, "new-pw-456789", &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    // Issuing a reset token leaves the verification token intact.
    let _reset = app
        .verification
        .create_password_reset("cross@x.com", &app.ctx())
        .await
        .unwrap()
        .unwrap();
    app.verification
        .verify_email(&verify_token, &app.ctx())
        .await
        .unwrap();
}
