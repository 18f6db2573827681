//! Audit trail for authentication and authorization decisions

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeep_types::UserId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Types of auditable events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Registered,
    LoginSucceeded,
    LoginFailed,
    /// Attempt rejected because the account is locked
    LoginRejectedLocked,
    AccountLocked,
    TokenRefreshed,
    RefreshRejected,
    AccessGranted,
    AccessDenied,
}

impl AuditEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::LoginRejectedLocked => "login_rejected_locked",
            Self::AccountLocked => "account_locked",
            Self::TokenRefreshed => "token_refreshed",
            Self::RefreshRejected => "refresh_rejected",
            Self::AccessGranted => "access_granted",
            Self::AccessDenied => "access_denied",
        }
    }
}

/// Receives every auth decision
pub trait AuditSink: Send + Sync {
    fn record(&self, event_type: AuditEventType, user_id: Option<UserId>, metadata: serde_json::Value);
}

/// Writes audit events as structured logs on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event_type: AuditEventType, user_id: Option<UserId>, metadata: serde_json::Value) {
        let user_id = user_id.map(|id| id.to_string());
        tracing::info!(
            target: "audit",
            event = event_type.as_str(),
            user_id = user_id.as_deref().unwrap_or("-"),
            metadata = %metadata,
            "audit event"
        );
    }
}

/// A recorded audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub user_id: Option<UserId>,
    pub metadata: serde_json::Value,
}

/// Keeps events in memory; used by tests and local tooling
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Count events of one type
    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event_type: AuditEventType, user_id: Option<UserId>, metadata: serde_json::Value) {
        self.events.lock().push(AuditEvent {
            timestamp: Utc::now(),
            event_type,
            user_id,
            metadata,
        });
    }
}
