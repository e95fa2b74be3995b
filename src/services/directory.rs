//! Organization Directory client.
//!
//! The directory owns org/role bindings; this core only performs one signed
//! lookup per login/refresh. Failures map to distinct engine errors and never
//! hang the caller thanks to bounded timeouts.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::DirectoryConfig;
use crate::utils::signature::sign_request;

/// Org binding for an account, as returned by the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgInfo {
    pub user_id: String,
    pub org_id: String,
    pub role: String,
}

/// Typed directory failures. The boundary reports all of them as
/// service-unavailable; the engine and logs keep the distinction.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("user not found in organization directory")]
    UserNotFound,
    #[error("directory rejected service authentication")]
    AuthRejected,
    #[error("organization directory timeout")]
    Timeout,
    #[error("organization directory unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected directory response: {0}")]
    Unexpected(u16),
}

#[async_trait]
pub trait OrgDirectory: Send + Sync {
    async fn user_org_info(&self, email: &str) -> Result<OrgInfo, DirectoryError>;
}

/// HTTP client for the directory's internal user endpoint. Requests carry an
/// HMAC signature over `method|path|body|service_id|timestamp` plus the
/// timestamp itself so the receiver can enforce its replay window.
pub struct HttpOrgDirectory {
    http: reqwest::Client,
    base_url: String,
    service_id: String,
    service_token: String,
    service_secret: String,
}

impl HttpOrgDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_id: config.service_id.clone(),
            service_token: config.service_token.clone(),
            service_secret: config.service_secret.clone(),
        })
    }
}

#[async_trait]
impl OrgDirectory for HttpOrgDirectory {
    async fn user_org_info(&self, email: &str) -> Result<OrgInfo, DirectoryError> {
        let path = format!("/internal/users/{}", email);
        let url = format!("{}{}", self.base_url, path);
        let timestamp = Utc::now().timestamp();

        let signature = sign_request(
            &self.service_secret,
            "GET",
            &path,
            "",
            &self.service_id,
            timestamp,
        )
        .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        let response = self
            .http
            .get(&url)
            .header("X-Service-Token", &self.service_token)
            .header("X-Service-ID", &self.service_id)
            .header("X-Timestamp", timestamp.to_string())
            .header("X-Signature", signature)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::error!(email = %email, "Timeout calling organization directory");
                    DirectoryError::Timeout
                } else {
                    tracing::error!(email = %email, error = %e, "Organization directory unreachable");
                    DirectoryError::Unreachable(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            200 => response
                .json::<OrgInfo>()
                .await
                .map_err(|e| DirectoryError::Unreachable(e.to_string())),
            404 => {
                tracing::error!(email = %email, "User not found in organization directory");
                Err(DirectoryError::UserNotFound)
            }
            403 => {
                tracing::error!("Service authentication rejected by organization directory");
                Err(DirectoryError::AuthRejected)
            }
            status => {
                tracing::error!(status = status, "Unexpected organization directory response");
                Err(DirectoryError::Unexpected(status))
            }
        }
    }
}

/// Directory double for tests: serves canned org info per email, or a forced
/// failure.
#[derive(Default)]
pub struct MockDirectory {
    entries: Mutex<HashMap<String, OrgInfo>>,
    failure: Mutex<Option<DirectoryError>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, email: &str, org: OrgInfo) {
        self.entries
            .lock()
            .expect("mock directory poisoned")
            .insert(email.to_string(), org);
    }

    /// Make every lookup fail until cleared.
    pub fn fail_with(&self, error: DirectoryError) {
        *self.failure.lock().expect("mock directory poisoned") = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().expect("mock directory poisoned") = None;
    }
}

#[async_trait]
impl OrgDirectory for MockDirectory {
    async fn user_org_info(&self, email: &str) -> Result<OrgInfo, DirectoryError> {
        if let Some(error) = self.failure.lock().expect("mock directory poisoned").clone() {
            return Err(error);
        }
        self.entries
            .lock()
            .expect("mock directory poisoned")
            .get(email)
            .cloned()
            .ok_or(DirectoryError::UserNotFound)
    }
}
