//! Access-token minting and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::ServiceError;
use crate::models::{AuthUser, Session};
use crate::services::directory::OrgInfo;

/// Claims carried by a bearer access token.
///
/// `password_changed_at` is the snapshot (epoch seconds) taken at mint time;
/// comparing it against the user's current value is the only revocation
/// mechanism for already-issued tokens, since JWTs cannot be recalled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the directory's user id.
    pub sub: String,
    /// Session this token was minted against.
    pub session_id: Uuid,
    pub email: String,
    pub org_id: String,
    pub role: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Issuer.
    pub iss: String,
    /// `password_changed_at` snapshot, epoch seconds.
    pub password_changed_at: i64,
}

/// JWT service for access-token generation and validation. HS256 with the
/// shared service secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        }
    }

    /// Mint an access token bound to a session, with the org binding and the
    /// password-change snapshot captured now.
    pub fn mint(
        &self,
        session: &Session,
        user: &AuthUser,
        org: &OrgInfo,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: org.user_id.clone(),
            session_id: session.id,
            email: user.email.clone(),
            org_id: org.org_id.clone(),
            role: org.role.clone(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            password_changed_at: user.password_epoch(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("token encoding failed: {}", e)))?;
        Ok(token)
    }

    /// Decode and verify signature, expiry and issuer. Session and
    /// password-change freshness checks happen in the engine.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;

        let data = decode::<AccessClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Access token lifetime in seconds, for `expires_in` responses.
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}
