//! Gatekeep Auth Core - Authentication business logic
//!
//! Token issuance and verification, account lockout bookkeeping, password
//! hashing and the audit trail, tied together by [`AuthService`].

pub mod audit;
pub mod config;
pub mod error;
pub mod lockout;
pub mod password;
pub mod service;
pub mod token;

pub use audit::{AuditEvent, AuditEventType, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{AuthConfig, AuthConfigError, LockoutConfig};
pub use error::AuthError;
pub use lockout::{AccountLock, LockState, LockoutGuard};
pub use service::{AuthOutcome, AuthService};
pub use token::{AccessClaims, Claims, RefreshClaims, TokenService};
