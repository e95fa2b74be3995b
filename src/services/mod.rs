//! Services layer.
//!
//! Business logic over the repository traits: the authentication engine,
//! ephemeral-token workflows, analytics, rate limiting and the outbound
//! collaborators (directory, email).

pub mod auth;
pub mod directory;
pub mod email;
pub mod jwt;
pub mod rate_limit;
pub mod security;
pub mod verification;

pub use auth::{AuthPolicy, AuthService, LoginGrant, RefreshGrant, RequestContext};
pub use directory::{DirectoryError, HttpOrgDirectory, MockDirectory, OrgDirectory, OrgInfo};
pub use email::{EmailProvider, EmailService, MockEmailService, SentEmail};
pub use jwt::{AccessClaims, JwtService};
pub use rate_limit::{RateLimiter, RatePolicy};
pub use security::{AbuseFinding, SecurityReport, SecurityService, UserSecuritySummary};
pub use verification::VerificationService;
