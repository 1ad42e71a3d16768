//! Agora background worker.
//!
//! Hosts the pieces of the social core that run outside request handling:
//! membership event delivery, periodic authority repair, and pool telemetry.

pub mod config;
pub mod events;
pub mod jobs;
pub mod logging;
pub mod telemetry;
