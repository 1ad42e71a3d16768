//! Domain layer for the Agora social backend.
//!
//! This crate contains:
//! - Domain models (groups, memberships, content, follows)
//! - Store ports and an in-memory store
//! - Membership, succession, visibility and feed engines
//! - Domain error types and membership events

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::{DomainError, StoreError};
