mod common;

use auth_core::error::ServiceError;
use auth_core::services::RatePolicy;
use common::TestApp;
use std::time::Duration;

#[tokio::test]
async fn eleventh_call_within_the_window_is_rejected() {
    let app = TestApp::spawn();
    let policy = RatePolicy::new(10, 300);

    for _ in 0..10 {
        app.rate_limiter
            .check("login", "10.0.0.1", policy)
            .await
            .unwrap();
    }

    let err = app
        .rate_limiter
        .check("login", "10.0.0.1", policy)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RateLimitExceeded {
            retry_after_secs: 300
        }
    ));
}

#[tokio::test]
async fn counter_resets_once_the_window_rolls() {
    let app = TestApp::spawn();
    let policy = RatePolicy {
        limit: 2,
        window: Duration::from_secs(1),
    };

    app.rate_limiter
        .check("login", "10.0.0.2", policy)
        .await
        .unwrap();
    app.rate_limiter
        .check("login", "10.0.0.2", policy)
        .await
        .unwrap();
    assert!(app
        .rate_limiter
        .check("login", "10.0.0.2", policy)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    app.rate_limiter
        .check("login", "10.0.0.2", policy)
        .await
        .unwrap();
}

#[tokio::test]
async fn counts_attempts_regardless_of_outcome() {
    // The boundary counts the attempt before authentication runs, so failed
    // and successful logins draw from the same budget.
    let app = TestApp::spawn();
    app.register_user("rl@x.com", "pw123456").await;
    let policy = RatePolicy::new(3, 300);

    for _ in 0..2 {
        app.rate_limiter
            .check("login", "10.0.0.3", policy)
            .await
            .unwrap();
        let _ = app
            .auth
            .authenticate_credentials("rl@x.com", "wrong-pw", &app.ctx_from("10.0.0.3"))
            .await;
    }

    app.rate_limiter
        .check("login", "10.0.0.3", policy)
        .await
        .unwrap();
    app.auth
        .authenticate_credentials("rl@x.com", "pw123456", &app.ctx_from("10.0.0.3"))
        .await
        .unwrap();

    assert!(app
        .rate_limiter
        .check("login", "10.0.0.3", policy)
        .await
        .is_err());
}
