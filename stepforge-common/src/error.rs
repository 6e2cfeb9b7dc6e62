//! Error types shared across stepforge crates
//!
//! Service crates work in terms of these variants so HTTP layers can map
//! them to status codes without inspecting message text: `NotFound` and
//! `InvalidInput` carry user-visible resolution failures (unknown or
//! ambiguous hash prefixes, malformed requests), `Config` carries missing
//! collaborator credentials, and everything else is internal.

use thiserror::Error;

/// Result alias used throughout stepforge.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Ledger query or migration failure
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Volume or filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid service configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No document or step matches the given key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request the caller can correct and retry
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure the caller cannot act on
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A collaborator credential required by the request is not configured.
    ///
    /// Both the pipeline preflight and the per-batch guards report missing
    /// keys this way, so the message always names the environment variable
    /// the operator has to set.
    pub fn missing_credential(purpose: &str, env_var: &str) -> Self {
        Error::Config(format!("{purpose} requires {env_var} to be configured"))
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
