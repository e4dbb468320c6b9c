//! Domain models for Stratum.
//!
//! These are the core types shared across all crates. Identifiers are
//! positive 64-bit integers; zero is never a valid id.

pub mod global_identity;
pub mod module;
pub mod permission;
pub mod plan;
pub mod role;
pub mod tenant;
pub mod user;
