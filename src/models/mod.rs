pub mod audit_event;
pub mod ephemeral_token;
pub mod session;
pub mod user;

pub use audit_event::{AuditAction, AuditEvent, IpFailureCount, UserFailureCount};
pub use ephemeral_token::{EphemeralToken, TokenPurpose};
pub use session::{DeviceInfo, DeviceType, Session, SessionInfo, SessionStatus};
pub use user::{AuthUser, UserSummary};
