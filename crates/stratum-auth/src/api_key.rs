//! Opaque API keys of the form `{tenant_id}_{64 hex chars}`.
//!
//! The tenant id prefix lets validation go straight to the owning tenant.
//! Only the SHA-256 digest of a key is ever stored.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const SECRET_BYTES: usize = 32;
const SECRET_HEX_LEN: usize = SECRET_BYTES * 2;

/// Generate a fresh key for `tenant_id`.
pub fn generate(tenant_id: u64) -> String {
    let mut secret = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut secret);
    format!("{tenant_id}_{}", hex::encode(secret))
}

/// Check the key format and extract the tenant id. Performs no I/O.
pub fn parse_tenant_id(key: &str) -> Result<u64, AuthError> {
    let (prefix, secret) = key
        .split_once('_')
        .ok_or(AuthError::MalformedApiKey("missing tenant prefix"))?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::MalformedApiKey("tenant prefix must be decimal digits"));
    }
    if secret.len() != SECRET_HEX_LEN || !secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthError::MalformedApiKey("secret must be 64 hex characters"));
    }
    match prefix.parse::<u64>() {
        Ok(0) => Err(AuthError::MalformedApiKey("tenant id cannot be zero")),
        Ok(tenant_id) => Ok(tenant_id),
        Err(_) => Err(AuthError::MalformedApiKey("tenant id out of range")),
    }
}

/// Hex SHA-256 digest stored in place of the raw key.
pub fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
