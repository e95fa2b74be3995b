//! Credential and session lifecycle core.
//!
//! Authenticates credentials against the credential store, issues and
//! rotates device-bound sessions, mints and validates bearer tokens,
//! enforces lockout and rate-limit policy, and runs the security analytics
//! and cleanup jobs. The HTTP boundary and task scheduler consume the
//! services exposed here; persistence sits behind the `store` traits.

pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;
pub mod store;
pub mod tasks;
pub mod utils;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::ServiceError;
use crate::services::{
    AuthPolicy, AuthService, EmailProvider, EmailService, HttpOrgDirectory, JwtService,
    RateLimiter, RatePolicy, SecurityService, VerificationService,
};
use crate::store::{Database, RedisCounterStore};

/// Fully wired production core: PostgreSQL stores, Redis counters, signed
/// HTTP directory client and SMTP mailer.
#[derive(Clone)]
pub struct AuthCore {
    pub config: AuthConfig,
    pub db: Database,
    pub auth: AuthService,
    pub verification: VerificationService,
    pub security: SecurityService,
    pub rate_limiter: RateLimiter,
    pub email: Arc<dyn EmailProvider>,
}

impl AuthCore {
    /// Connect to the backing services and assemble the engine.
    pub async fn connect(config: AuthConfig) -> Result<Self, ServiceError> {
        let pool = db::create_pool(&config.database)
            .await
            .map_err(|e| ServiceError::Database(anyhow::anyhow!(e)))?;
        db::run_migrations(&pool)
            .await
            .map_err(|e| ServiceError::Database(anyhow::anyhow!(e)))?;
        let database = Database::new(pool);

        let counters = Arc::new(RedisCounterStore::connect(&config.redis.url).await?);
        let directory = Arc::new(
            HttpOrgDirectory::new(&config.directory).map_err(ServiceError::Directory)?,
        );
        let email: Arc<dyn EmailProvider> = Arc::new(EmailService::new(&config.smtp)?);

        let users = Arc::new(database.clone());
        let sessions = Arc::new(database.clone());
        let tokens = Arc::new(database.clone());
        let audit = Arc::new(database.clone());

        let jwt = JwtService::new(&config.jwt);
        let security = SecurityService::new(
            audit.clone(),
            sessions.clone(),
            users.clone(),
            config.security.clone(),
        );
        let auth = AuthService::new(
            users.clone(),
            sessions.clone(),
            audit.clone(),
            directory,
            jwt,
            security.clone(),
            AuthPolicy::from_config(&config),
        );
        let verification = VerificationService::new(users, sessions, tokens, audit);
        let rate_limiter = RateLimiter::new(counters);

        Ok(Self {
            config,
            db: database,
            auth,
            verification,
            security,
            rate_limiter,
            email,
        })
    }

    /// Hourly sweep: expire overdue sessions and drop ones past retention.
    pub async fn run_session_sweep(&self) -> Result<tasks::SessionCleanup, ServiceError> {
        tasks::cleanup_expired_sessions(&self.db, self.config.retention.session_days).await
    }

    /// Daily sweep: drop expired verification/reset tokens.
    pub async fn run_token_sweep(&self) -> Result<u64, ServiceError> {
        tasks::cleanup_expired_tokens(&self.db).await
    }

    /// Daily sweep: prune audit events past retention.
    pub async fn run_audit_prune(&self) -> Result<u64, ServiceError> {
        tasks::cleanup_audit_log(&self.db, self.config.retention.audit_days).await
    }

    /// Budget for login attempts, keyed by caller IP.
    pub fn login_rate_policy(&self) -> RatePolicy {
        RatePolicy::new(
            self.config.rate_limit.login_limit,
            self.config.rate_limit.login_window_seconds,
        )
    }

    /// Budget for password-reset requests, keyed by target email.
    pub fn password_reset_rate_policy(&self) -> RatePolicy {
        RatePolicy::new(
            self.config.rate_limit.password_reset_limit,
            self.config.rate_limit.password_reset_window_seconds,
        )
    }
}
