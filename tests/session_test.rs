mod common;

use auth_core::error::ServiceError;
use auth_core::store::SessionStore;
use chrono::{Duration, Utc};
use common::TestApp;
use std::time::Duration as StdDuration;

#[tokio::test]
async fn logout_kills_access_and_refresh_immediately() {
    let app = TestApp::spawn();
    app.register_user("a@x.com", "pw123456").await;
    let grant = app.login("a@x.com", "pw123456").await;

    let session = app
        .store
        .find_by_id(grant.session_id)
        .await
        .unwrap()
        .unwrap();

    app.auth
        .logout(&session.session_token, &app.ctx())
        .await
        .unwrap();

    let err = app
        .auth
        .validate_access_token(&grant.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotFound));

    let err = app
        .auth
        .refresh_session(&grant.refresh_token, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    // Logging out twice is not possible either.
    let err = app
        .auth
        .logout(&session.session_token, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotFound));
}

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let app = TestApp::spawn();
    app.register_user("r@x.com", "pw123456").await;
    let grant = app.login("r@x.com", "pw123456").await;

    let refreshed = app
        .auth
        .refresh_session(&grant.refresh_token, &app.ctx())
        .await
        .unwrap();

    assert_eq!(refreshed.session_id, grant.session_id);
    assert_ne!(refreshed.refresh_token, grant.refresh_token);

    // The superseded refresh token is dead.
    let err = app
        .auth
        .refresh_session(&grant.refresh_token, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    // The new pair works.
    app.auth
        .validate_access_token(&refreshed.access_token)
        .await
        .unwrap();
    app.auth
        .refresh_session(&refreshed.refresh_token, &app.ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn directory_outage_during_refresh_leaves_the_session_untouched() {
    let app = TestApp::spawn();
    app.register_user("r2@x.com", "pw123456").await;
    let grant = app.login("r2@x.com", "pw123456").await;

    app.directory
        .fail_with(auth_core::services::DirectoryError::Unreachable(
            "connection refused".to_string(),
        ));
    let err = app
        .auth
        .refresh_session(&grant.refresh_token, &app.ctx())
        .await
        .unwrap_err();
    assert!(err.is_service_unavailable());

    // No partial rotation happened: the same refresh token works once the
    // directory is back.
    app.directory.clear_failure();
    let refreshed = app
        .auth
        .refresh_session(&grant.refresh_token, &app.ctx())
        .await
        .unwrap();
    assert_eq!(refreshed.session_id, grant.session_id);
}

#[tokio::test]
async fn overdue_session_expires_on_validation_and_refresh() {
    let app = TestApp::spawn();
    app.register_user("e@x.com", "pw123456").await;
    let grant = app.login("e@x.com", "pw123456").await;

    // Push the session past its expiry while keeping it nominally active.
    let session = app
        .store
        .find_by_id(grant.session_id)
        .await
        .unwrap()
        .unwrap();
    app.store
        .rotate_tokens(
            grant.session_id,
            &session.session_token,
            &session.refresh_token,
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap();

    let err = app
        .auth
        .validate_access_token(&grant.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionExpired));

    // The validation flipped the row; the refresh token is now dead too.
    let err = app
        .auth
        .refresh_session(&session.refresh_token, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));
}

#[tokio::test]
async fn change_password_invalidates_earlier_tokens() {
    let app = TestApp::spawn();
    let user = app.register_user("a@x.com", "pw123456").await;
    let grant = app.login("a@x.com", "pw123456").await;

    // The claim snapshot has second granularity; make sure the change lands
    // in a later second than the mint.
    tokio::time::sleep(StdDuration::from_millis(1100)).await;

    let revoked = app
        .auth
        .change_password(
            user.id,
            Some(grant.session_id),
            "pw123456",
            "new-pw-456789",
            true,
            &app.ctx(),
        )
        .await
        .unwrap();
    // Only the caller's session existed, and it was spared.
    assert_eq!(revoked, 0);

    let err = app
        .auth
        .validate_access_token(&grant.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TokenInvalidatedByPasswordChange));

    // A fresh login with the new password yields a new, distinct session.
    let fresh = app.login("a@x.com", "new-pw-456789").await;
    assert_ne!(fresh.session_id, grant.session_id);
    app.auth
        .validate_access_token(&fresh.access_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn change_password_rejects_wrong_current_and_unchanged_new() {
    let app = TestApp::spawn();
    let user = app.register_user("c@x.com", "pw123456").await;

    let err = app
        .auth
        .change_password(user.id, None, "wrong-pw", "new-pw-456789", false, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredentials));

    let err = app
        .auth
        .change_password(user.id, None, "pw123456", "pw123456", false, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationFailed(_)));
}

#[tokio::test]
async fn change_password_with_revoke_others_spares_only_the_caller() {
    let app = TestApp::spawn();
    let user = app.register_user("multi@x.com", "pw123456").await;

    let phone = app.login("multi@x.com", "pw123456").await;
    let laptop = app.login("multi@x.com", "pw123456").await;

    let revoked = app
        .auth
        .change_password(
            user.id,
            Some(laptop.session_id),
            "pw123456",
            "new-pw-456789",
            true,
            &app.ctx(),
        )
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let sessions = app.auth.list_sessions(user.id, Some(laptop.session_id)).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, laptop.session_id);
    assert!(sessions[0].is_current);

    let phone_session = app.store.find_by_id(phone.session_id).await.unwrap().unwrap();
    assert_eq!(phone_session.status, "revoked");
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = TestApp::spawn();
    let user = app.register_user("all@x.com", "pw123456").await;

    app.login("all@x.com", "pw123456").await;
    app.login("all@x.com", "pw123456").await;
    app.login("all@x.com", "pw123456").await;

    let revoked = app.auth.logout_all(user.id, &app.ctx()).await.unwrap();
    assert_eq!(revoked, 3);

    let sessions = app.auth.list_sessions(user.id, None).await.unwrap();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn revoke_session_enforces_ownership() {
    let app = TestApp::spawn();
    let alice = app.register_user("alice@x.com", "pw123456").await;
    let bob = app.register_user("bob@x.com", "pw123456").await;

    let alice_grant = app.login("alice@x.com", "pw123456").await;

    // Bob cannot revoke Alice's session.
    let err = app
        .auth
        .revoke_session(bob.id, alice_grant.session_id, &app.ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotFound));

    // Alice can, and her access token dies with it.
    app.auth
        .revoke_session(alice.id, alice_grant.session_id, &app.ctx())
        .await
        .unwrap();
    let err = app
        .auth
        .validate_access_token(&alice_grant.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotFound));
}

#[tokio::test]
async fn garbage_token_is_invalid() {
    let app = TestApp::spawn();
    let err = app
        .auth
        .validate_access_token("not-a-jwt")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));
}
