//! Shared utilities and common types for the Agora backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Offset/limit pagination requests and pages
//! - Reusable validators for request payloads

pub mod pagination;
pub mod validation;
