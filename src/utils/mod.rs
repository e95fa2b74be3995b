pub mod password;
pub mod signature;
pub mod tokens;

pub use password::{hash_password, verify_password};
pub use tokens::{generate_token, generate_token_pair, normalize_email};
