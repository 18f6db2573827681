//! Application state

use std::sync::Arc;
use std::time::{Duration, Instant};

use gatekeep_auth_core::AuthService;

use crate::config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Auth service for registration, login, refresh and token checks
    pub auth: Arc<AuthService>,
    /// Application configuration
    pub config: Arc<Config>,
    started_at: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(auth: AuthService, config: Config) -> Self {
        Self {
            auth: Arc::new(auth),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    /// Time since the state was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }
}
