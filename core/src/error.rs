//! Error types for the ACS client.
//!
//! # Design
//! Every failure path of the client is one `AcsError` variant. The four
//! protocol-level cases are configuration, authentication, transport and API
//! failures. An API failure is a well-formed envelope whose `meta.status` is
//! not `"ok"`. The remaining variants cover local encode/decode and
//! cookie-file problems, keeping the raw detail for debugging.

use std::io;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by `AcsClient` operations.
#[derive(Debug, Error)]
pub enum AcsError {
    /// A required configuration value is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server rejected the login.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The request never produced a response (network, DNS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a non-`ok` envelope.
    #[error("api error: {message}")]
    Api { code: Option<u16>, message: String },

    /// The response body is not a decodable envelope.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A request payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The cookie file could not be created, read or written.
    #[error("cookie storage: {0}")]
    CookieStorage(#[from] io::Error),
}

impl AcsError {
    /// Server-supplied message for authentication and API failures.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            AcsError::Authentication { message } | AcsError::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

pub type Result<T, E = AcsError> = std::result::Result<T, E>;
