//! Error types for configuring the API service.
//!
//! This module contains the error returned while building a
//! [`ServiceConfig`](crate::ServiceConfig) or a
//! [`ServiceClient`](crate::ServiceClient), and while installing the
//! process-wide pinned key hash.
//!
//! # Error Handling
//!
//! All configuration constructors return `Result<T, ConfigError>` to enable
//! fail-fast validation. Error messages are designed to be clear and actionable.
//!
//! # Example
//!
//! ```rust
//! use api_service::{ConfigError, ServiceHost};
//!
//! let result = ServiceHost::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyHost)));
//! ```

use thiserror::Error;

/// Errors that can occur while configuring the service.
///
/// Each variant provides a clear, actionable error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Host cannot be empty.
    #[error("Service host cannot be empty. Please provide a host such as 'api.example.com' or 'localhost:8080'.")]
    EmptyHost,

    /// Host is malformed.
    #[error("Invalid service host '{host}'. Expected 'name' or 'name:port' without scheme or path.")]
    InvalidHost {
        /// The invalid host that was provided.
        host: String,
    },

    /// Scheme is not supported.
    #[error("Invalid scheme '{scheme}'. Expected 'http' or 'https'.")]
    InvalidScheme {
        /// The invalid scheme that was provided.
        scheme: String,
    },

    /// Base path is malformed.
    #[error("Invalid base path '{path}'. Expected an empty string or a path such as '/api/v1'.")]
    InvalidBasePath {
        /// The invalid base path that was provided.
        path: String,
    },

    /// A timeout of zero was provided.
    #[error("Invalid {field}: the duration must be greater than zero.")]
    InvalidTimeout {
        /// The name of the offending setting.
        field: &'static str,
    },

    /// The pinned key hash is not a base64 SHA-256 digest.
    #[error("Invalid pinned key hash '{hash}'. Expected the base64 encoding of a 32-byte SHA-256 digest.")]
    InvalidPinnedKeyHash {
        /// The invalid hash that was provided.
        hash: String,
    },

    /// A different pinned key hash was already installed for this process.
    #[error("A different pinned key hash is already configured for this process. Pins cannot be rotated at runtime.")]
    PinnedKeyHashAlreadySet,

    /// The client was built outside of a Tokio runtime.
    #[error("No Tokio runtime is available. Build the client from within a Tokio runtime context.")]
    MissingRuntime,

    /// The underlying HTTP transport could not be created.
    #[error("Failed to create HTTP transport: {reason}")]
    Transport {
        /// Why the transport could not be created.
        reason: String,
    },
}
