//! Gatekeep Auth API
//!
//! Authentication service exposing registration, login, token refresh and
//! profile lookup over HTTP.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
