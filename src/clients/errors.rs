//! Error types for API service requests.
//!
//! Every request resolves to either a value or exactly one [`ServiceError`].
//!
//! # Error Handling
//!
//! The client uses specific error types for different failure scenarios:
//!
//! - [`ConnectivityError`]: The host was known to be unreachable; nothing was sent
//! - [`TransportError`]: The request could not complete at the transport level
//!   (timeout, connection failure, cancellation, rejected server identity)
//! - [`HttpStatusError`]: The server answered with a status outside `200..=399`
//! - [`serde_json::Error`]: The body could not be decoded as JSON
//! - [`InvalidRequestError`]: The request was rejected before any network access
//! - [`ServiceError`]: Unified error type encompassing all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use api_service::{ServiceError, TransportErrorKind};
//!
//! match client.get("photos", &query).await {
//!     Ok(body) => println!("Success: {:?}", body),
//!     Err(ServiceError::Status(e)) => println!("HTTP {}: {}", e.code, e.reason),
//!     Err(ServiceError::Transport(e)) if e.kind == TransportErrorKind::Cancelled => {}
//!     Err(e) => println!("Request failed: {}", e),
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error returned when the backend host is known to be unreachable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("The service host {host} is not reachable.")]
pub struct ConnectivityError {
    /// The host that was probed.
    pub host: String,
}

/// The category of a [`TransportError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The per-request timeout elapsed.
    Timeout,
    /// The connection could not be established or was reset.
    Connection,
    /// The request was cancelled before it completed.
    Cancelled,
    /// The server identity failed chain validation or the key pin.
    TrustRejected,
    /// Any other transport failure.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "request timed out",
            Self::Connection => "connection failed",
            Self::Cancelled => "request cancelled",
            Self::TrustRejected => "server trust rejected",
            Self::Other => "transport error",
        })
    }
}

/// Error returned when a request fails below the HTTP layer.
///
/// # Example
///
/// ```rust
/// use api_service::clients::{TransportError, TransportErrorKind};
///
/// let error = TransportError::cancelled();
/// assert_eq!(error.kind, TransportErrorKind::Cancelled);
/// assert_eq!(error.to_string(), "request cancelled");
/// ```
#[derive(Debug, Error)]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Detail from the underlying transport, if any.
    pub message: Option<String>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl TransportError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            source: None,
        }
    }

    /// The error delivered for a request that was cancelled.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            kind: TransportErrorKind::Cancelled,
            message: None,
            source: None,
        }
    }

    /// Returns `true` if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportErrorKind::Cancelled
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        // Trust rejection surfaces as a connect error, so it is checked first.
        let kind = if caused_by_tls_rejection(&error) {
            TransportErrorKind::TrustRejected
        } else if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connection
        } else {
            TransportErrorKind::Other
        };

        Self {
            kind,
            message: Some(error.to_string()),
            source: Some(Box::new(error)),
        }
    }
}

fn caused_by_tls_rejection(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);

    while let Some(err) = current {
        if err.is::<rustls::Error>() {
            return true;
        }
        // io::Error hides its payload from `source()`.
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io
                .get_ref()
                .is_some_and(|inner| inner.is::<rustls::Error>())
            {
                return true;
            }
        }
        current = err.source();
    }
    false
}

/// Error returned when the server answers with a status outside `200..=399`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("HTTP {code}: {reason}")]
pub struct HttpStatusError {
    /// The HTTP status code of the response.
    pub code: u16,
    /// The standard reason phrase for the code.
    pub reason: String,
}

impl HttpStatusError {
    /// Creates an error carrying the standard reason phrase for `code`.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        let reason = reqwest::StatusCode::from_u16(code)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown Status")
            .to_string();
        Self { code, reason }
    }
}

/// Error returned when a request fails validation before it is sent.
///
/// # Example
///
/// ```rust
/// use std::path::PathBuf;
/// use api_service::clients::InvalidRequestError;
///
/// let error = InvalidRequestError::FileNotFound {
///     path: PathBuf::from("/tmp/missing.jpg"),
/// };
/// assert!(error.to_string().contains("/tmp/missing.jpg"));
/// ```
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidRequestError {
    /// The upload path does not exist.
    #[error("Upload file {} does not exist.", path.display())]
    FileNotFound {
        /// The path that was provided.
        path: PathBuf,
    },

    /// The upload path exists but is not a regular file.
    #[error("Upload path {} is not a file.", path.display())]
    NotAFile {
        /// The path that was provided.
        path: PathBuf,
    },

    /// The upload file could not be read.
    #[error("Could not read upload file {}: {reason}", path.display())]
    UnreadableFile {
        /// The path that was provided.
        path: PathBuf,
        /// The underlying I/O failure.
        reason: String,
    },

    /// The structured body could not be encoded as a JSON object.
    #[error("Request body must serialize to a JSON object: {reason}")]
    InvalidBody {
        /// Why encoding failed.
        reason: String,
    },
}

/// Unified error type for API service requests.
///
/// # Example
///
/// ```rust,ignore
/// use api_service::ServiceError;
///
/// match client.delete("photos/42", None).await {
///     Ok(()) => {}
///     Err(ServiceError::Connectivity(e)) => { /* offline */ }
///     Err(ServiceError::Transport(e)) => { /* timeout, reset, cancelled, pin */ }
///     Err(ServiceError::Status(e)) => { /* non-success status */ }
///     Err(ServiceError::Decode(e)) => { /* bad JSON */ }
///     Err(ServiceError::Validation(e)) => { /* rejected before sending */ }
/// }
/// ```
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The host is known to be unreachable.
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error(transparent)]
    Status(#[from] HttpStatusError),

    /// The response body was not valid JSON.
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request was rejected before sending.
    #[error(transparent)]
    Validation(#[from] InvalidRequestError),
}

impl ServiceError {
    /// Returns the HTTP status code for [`ServiceError::Status`].
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(e) => Some(e.code),
            _ => None,
        }
    }

    /// Returns `true` if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_cancelled())
    }
}
