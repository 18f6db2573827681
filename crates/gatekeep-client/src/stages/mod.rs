//! Built-in pipeline stages
//!
//! The cache and retry stages live next to their stores in
//! [`crate::cache`] and [`crate::retry`].

pub mod auth;
pub mod error_mapper;
pub mod logging;

pub use auth::AuthStage;
pub use error_mapper::map_error;
pub use logging::LoggingStage;
