//! Token material and identifier normalization.

use rand::RngCore;

/// Bytes of entropy per opaque token; 32 bytes keeps collisions negligible
/// even without the unique-index backstop.
const TOKEN_BYTES: usize = 32;

/// Generate an unguessable opaque token (hex-encoded, 256 bits).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a session/refresh token pair.
pub fn generate_token_pair() -> (String, String) {
    (generate_token(), generate_token())
}

/// Canonical form for account emails: trimmed and lower-cased. Applied at
/// every engine entry point that accepts an email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
