//! Shared harness for integration tests.
//!
//! Wires the engine over the in-memory stores, a canned directory and a
//! recording mailer, so tests run without PostgreSQL, Redis or SMTP.

#![allow(dead_code)]

use std::sync::Arc;

use auth_core::config::{JwtConfig, SecurityThresholds};
use auth_core::models::{AuthUser, DeviceInfo};
use auth_core::services::{
    AuthPolicy, AuthService, JwtService, LoginGrant, MockDirectory, MockEmailService, OrgInfo,
    RateLimiter, RequestContext, SecurityService, VerificationService,
};
use auth_core::store::{MemoryCounterStore, MemoryStore};
use auth_core::utils::{hash_password, normalize_email};

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MockDirectory>,
    pub mailer: Arc<MockEmailService>,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub verification: VerificationService,
    pub security: SecurityService,
    pub rate_limiter: RateLimiter,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_policy(AuthPolicy::default())
    }

    pub fn with_policy(policy: AuthPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MockDirectory::new());
        let mailer = Arc::new(MockEmailService::new());

        let jwt = JwtService::new(&JwtConfig {
            secret: "integration-test-secret-0123456789abcdef".to_string(),
            issuer: "auth-core".to_string(),
            access_token_expiry_minutes: 60,
        });

        let security = SecurityService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            SecurityThresholds::default(),
        );

        let auth = AuthService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            directory.clone(),
            jwt.clone(),
            security.clone(),
            policy,
        );

        let verification = VerificationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );

        let rate_limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));

        Self {
            store,
            directory,
            mailer,
            jwt,
            auth,
            verification,
            security,
            rate_limiter,
        }
    }

    /// Insert a user with a hashed password and register its org binding in
    /// the directory double.
    pub async fn register_user(&self, email: &str, password: &str) -> AuthUser {
        let email = normalize_email(email);
        let user = AuthUser::new(email.clone(), hash_password(password).unwrap());

        use auth_core::store::CredentialStore;
        self.store.insert_user(&user).await.unwrap();

        self.directory.insert(
            &email,
            OrgInfo {
                user_id: format!("ext-{}", user.id),
                org_id: "org-1".to_string(),
                role: "member".to_string(),
            },
        );

        user
    }

    pub async fn login(&self, email: &str, password: &str) -> LoginGrant {
        self.auth
            .login(email, password, DeviceInfo::default(), &self.ctx())
            .await
            .expect("login failed")
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::new("127.0.0.1", Some("integration-tests".to_string()))
    }

    pub fn ctx_from(&self, ip: &str) -> RequestContext {
        RequestContext::new(ip, Some("integration-tests".to_string()))
    }
}
