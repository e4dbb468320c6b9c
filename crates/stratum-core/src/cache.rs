//! Key-value cache abstraction.
//!
//! Values are stored as strings; structured records go through the JSON
//! helpers below. Every operation may fail with an infrastructure error,
//! which callers are expected to treat as a miss.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StratumError, StratumResult};

pub trait KeyValueCache: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = StratumResult<Option<String>>> + Send;
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = StratumResult<()>> + Send;
    fn delete(&self, key: &str) -> impl Future<Output = StratumResult<()>> + Send;
    /// Keys matching a glob pattern where `*` matches any run of characters.
    fn scan(&self, pattern: &str) -> impl Future<Output = StratumResult<Vec<String>>> + Send;
}

pub async fn get_json<K, T>(cache: &K, key: &str) -> StratumResult<Option<T>>
where
    K: KeyValueCache + ?Sized,
    T: DeserializeOwned,
{
    match cache.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StratumError::Internal(format!("corrupt cache entry {key}: {e}"))),
        None => Ok(None),
    }
}

pub async fn set_json<K, T>(cache: &K, key: &str, value: &T, ttl: Duration) -> StratumResult<()>
where
    K: KeyValueCache + ?Sized,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)
        .map_err(|e| StratumError::Internal(format!("cache serialization failed: {e}")))?;
    cache.set(key, raw, ttl).await
}

/// Glob matcher shared by cache backends that cannot scan natively.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
