//! Authentication error types.

use stratum_core::error::StratumError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user and wrong password are deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing credential")]
    MissingCredential,

    #[error("malformed API key: {0}")]
    MalformedApiKey(&'static str),

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("API key has expired")]
    ApiKeyExpired,

    #[error("tenant account is suspended")]
    TenantSuspended,

    #[error("user account is disabled")]
    AccountDisabled,

    #[error("{0}")]
    Policy(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for StratumError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MalformedApiKey(_) | AuthError::Policy(_) => {
                StratumError::validation(err.to_string())
            }
            AuthError::InvalidCredentials
            | AuthError::MissingCredential
            | AuthError::InvalidApiKey
            | AuthError::ApiKeyExpired
            | AuthError::TenantSuspended
            | AuthError::AccountDisabled => StratumError::unauthorized(err.to_string()),
            AuthError::Crypto(msg) => StratumError::Crypto(msg),
        }
    }
}
