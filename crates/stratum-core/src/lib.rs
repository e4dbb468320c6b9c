//! Core types for Stratum: models, errors, repository traits, tenant
//! scoping and the connection router.

pub mod cache;
pub mod error;
pub mod models;
pub mod repository;
pub mod router;
pub mod scope;
