//! Persistence layer for the Agora social core.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - [`PgStore`], the PostgreSQL implementation of the domain store ports

pub mod db;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use db::{create_pool, DatabaseConfig};
pub use error::map_sqlx_error;
pub use store::{PgStore, PgSuccessionScope};
