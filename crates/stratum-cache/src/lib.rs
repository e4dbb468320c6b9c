//! Key-value cache backends for Stratum.

pub mod memory;

pub use memory::{CacheConfig, MemoryCache};
