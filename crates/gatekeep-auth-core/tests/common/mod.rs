//! Common test utilities for gatekeep-auth-core integration tests

pub mod slow_repo;

use std::sync::Arc;

use gatekeep_auth_core::{AuthConfig, AuthService, LockoutConfig, MemoryAuditSink};
use gatekeep_db::AccountRepository;
use gatekeep_types::RegisterRequest;

#[allow(unused_imports)]
pub use slow_repo::SlowAccountRepository;

pub const PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> AuthConfig {
    AuthConfig::try_new("access-secret-".repeat(3), "refresh-secret-".repeat(3))
        .expect("test secrets are valid")
        .with_lockout(LockoutConfig::default())
}

/// Auth service over `accounts` with an in-memory audit sink
pub fn service_with(
    config: AuthConfig,
    accounts: Arc<dyn AccountRepository>,
) -> (AuthService, MemoryAuditSink) {
    let audit = MemoryAuditSink::new();
    let service = AuthService::new(config, accounts)
        .expect("valid config")
        .with_audit_sink(Arc::new(audit.clone()));
    (service, audit)
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
        role: None,
    }
}
