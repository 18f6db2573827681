//! HTTP handlers

mod auth;
mod health;
mod users;

pub use auth::{login, me, refresh, register};
pub use health::health;
pub use users::get_user;
