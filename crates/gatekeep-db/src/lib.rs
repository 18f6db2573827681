//! Gatekeep DB - Credential store
//!
//! Account persistence for the auth service. Two backends implement
//! [`AccountRepository`]:
//!
//! - [`pg::PgAccountRepository`] backed by PostgreSQL through SQLx
//! - [`memory::InMemoryAccountRepository`] for tests and single-process dev runs
//!
//! # Example
//!
//! ```rust,ignore
//! use gatekeep_db::{create_pool, pg::PgAccountRepository, AccountRepository};
//!
//! let pool = create_pool("postgres://localhost/gatekeep").await?;
//! gatekeep_db::pg::run_migrations(&pool).await?;
//! let accounts = PgAccountRepository::new(pool);
//!
//! let account = accounts.find_by_email("user@example.com").await?;
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use memory::InMemoryAccountRepository;
pub use models::*;
pub use pool::{create_pool, DbPool};
pub use repo::*;
