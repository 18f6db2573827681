//! Gatekeep Types - Shared domain types
//!
//! This crate contains domain types used on both sides of the wire:
//! - User identity and roles
//! - Token pairs and auth request/response bodies
//! - API error envelopes

pub mod api;
pub mod auth;
pub mod error;
pub mod user;

pub use api::*;
pub use auth::*;
pub use error::*;
pub use user::*;
