//! Boundary request/response shapes. Routing lives outside this crate; these
//! are the contract the HTTP layer serializes against.

pub mod auth;

pub use auth::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    PasswordResetConfirm, PasswordResetRequest, RefreshRequest, RefreshResponse,
    RevokeSessionRequest, SessionEntry, VerifyEmailRequest,
};
