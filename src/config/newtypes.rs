//! Validated newtype wrappers for endpoint configuration values.
//!
//! This module provides type-safe wrappers around the pieces of the endpoint
//! URL. Invalid values are rejected with clear error messages.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// The URL scheme used to reach the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP, intended for local development.
    Http,
    /// HTTP over TLS.
    #[default]
    Https,
}

impl Scheme {
    /// Returns the scheme as it appears in a URL.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(ConfigError::InvalidScheme {
                scheme: s.to_string(),
            }),
        }
    }
}

/// A validated backend host, optionally with a port.
///
/// # Example
///
/// ```rust
/// use api_service::ServiceHost;
///
/// let host = ServiceHost::new("api.example.com:8443").unwrap();
/// assert_eq!(host.as_ref(), "api.example.com:8443");
/// assert_eq!(host.host_name(), "api.example.com");
/// assert_eq!(host.port(), Some(8443));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceHost {
    authority: String,
    name_end: usize,
    port: Option<u16>,
}

impl ServiceHost {
    /// Creates a new validated host.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyHost`] if the host is empty, or
    /// [`ConfigError::InvalidHost`] if it contains a scheme, a path,
    /// whitespace, or an unparseable port.
    pub fn new(host: impl Into<String>) -> Result<Self, ConfigError> {
        let host = host.into();
        let authority = host.trim().to_string();

        if authority.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let invalid = || ConfigError::InvalidHost {
            host: authority.clone(),
        };

        if authority.contains("://")
            || authority
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@'))
        {
            return Err(invalid());
        }

        let (name_end, port) = match authority.rsplit_once(':') {
            Some((name, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                (name.len(), Some(port))
            }
            None => (authority.len(), None),
        };

        if name_end == 0 {
            return Err(invalid());
        }

        Ok(Self {
            authority,
            name_end,
            port,
        })
    }

    /// Returns the host name without the port.
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.authority[..self.name_end]
    }

    /// Returns the explicit port, if one was configured.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }
}

impl Default for ServiceHost {
    /// `localhost:8080`, the development default.
    fn default() -> Self {
        Self {
            authority: "localhost:8080".to_string(),
            name_end: "localhost".len(),
            port: Some(8080),
        }
    }
}

impl AsRef<str> for ServiceHost {
    fn as_ref(&self) -> &str {
        &self.authority
    }
}

impl fmt::Display for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority)
    }
}

/// A validated base path prepended to every endpoint.
///
/// The path is either empty or starts with `/`; a trailing `/` is dropped so
/// that `"{base}/{endpoint}"` never produces a double slash.
///
/// # Example
///
/// ```rust
/// use api_service::BasePath;
///
/// assert_eq!(BasePath::new("/services/rest/").unwrap().as_ref(), "/services/rest");
/// assert_eq!(BasePath::new("").unwrap().as_ref(), "");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasePath(String);

impl BasePath {
    /// Creates a new validated base path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBasePath`] if the path does not start with
    /// `/` or contains a query, a fragment, or whitespace.
    pub fn new(path: impl Into<String>) -> Result<Self, ConfigError> {
        let path = path.into();
        let trimmed = path.trim().trim_end_matches('/');

        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        if !trimmed.starts_with('/')
            || trimmed
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '?' | '#'))
        {
            return Err(ConfigError::InvalidBasePath { path });
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for BasePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
