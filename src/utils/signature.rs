//! HMAC request signature for service-to-service calls.
//!
//! Payload format: `method|path|body|service_id|timestamp`, signed with the
//! shared service secret. The receiving side rejects signatures whose
//! timestamp falls outside the replay window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Sign a service request. `timestamp` is epoch seconds.
pub fn sign_request(
    secret: &str,
    method: &str,
    path: &str,
    body: &str,
    service_id: &str,
    timestamp: i64,
) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("invalid signing key: {}", e)))?;

    let payload = format!(
        "{}|{}|{}|{}|{}",
        method, path, body, service_id, timestamp
    );
    mac.update(payload.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature in constant time, enforcing the replay window
/// (`|now - timestamp| <= max_skew_secs`).
#[allow(clippy::too_many_arguments)]
pub fn verify_request(
    secret: &str,
    method: &str,
    path: &str,
    body: &str,
    service_id: &str,
    timestamp: i64,
    now: i64,
    max_skew_secs: i64,
    signature: &str,
) -> Result<bool, ServiceError> {
    if (now - timestamp).abs() > max_skew_secs {
        return Ok(false);
    }

    let expected = sign_request(secret, method, path, body, service_id, timestamp)?;
    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "shared-service-secret";

    #[test]
    fn sign_and_verify() {
        let timestamp = 1710000000;
        let signature = sign_request(
            SECRET,
            "GET",
            "/internal/users/a@x.com",
            "",
            "auth-core",
            timestamp,
        )
        .unwrap();

        let valid = verify_request(
            SECRET,
            "GET",
            "/internal/users/a@x.com",
            "",
            "auth-core",
            timestamp,
            timestamp + 10,
            300,
            &signature,
        )
        .unwrap();
        assert!(valid);
    }

    #[test]
    fn tampered_path_fails() {
        let timestamp = 1710000000;
        let signature = sign_request(
            SECRET,
            "GET",
            "/internal/users/a@x.com",
            "",
            "auth-core",
            timestamp,
        )
        .unwrap();

        let valid = verify_request(
            SECRET,
            "GET",
            "/internal/users/b@x.com",
            "",
            "auth-core",
            timestamp,
            timestamp,
            300,
            &signature,
        )
        .unwrap();
        assert!(!valid);
    }

    #[test]
    fn stale_timestamp_rejected() {
        let timestamp = 1710000000;
        let signature = sign_request(
            SECRET,
            "GET",
            "/internal/users/a@x.com",
            "",
            "auth-core",
            timestamp,
        )
        .unwrap();

        // 301 seconds later the replay window has closed.
        let valid = verify_request(
            SECRET,
            "GET",
            "/internal/users/a@x.com",
            "",
            "auth-core",
            timestamp,
            timestamp + 301,
            300,
            &signature,
        )
        .unwrap();
        assert!(!valid);
    }
}
