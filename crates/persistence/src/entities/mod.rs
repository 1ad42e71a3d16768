//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod content;
pub mod group;
pub mod user;

pub use content::*;
pub use group::*;
pub use user::*;
