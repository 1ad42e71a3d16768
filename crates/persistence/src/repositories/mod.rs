//! Repository implementations for database operations.

pub mod content;
pub mod group;
pub mod user;

pub use content::ContentRepository;
pub use group::{succession, GroupRepository};
pub use user::{FollowRepository, UserRepository};
