//! Configuration types for the API service.
//!
//! This module provides the endpoint configuration used to construct a
//! [`ServiceClient`](crate::ServiceClient).
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`ServiceConfig`]: The immutable endpoint and dispatch settings
//! - [`ServiceConfigBuilder`]: A builder for constructing [`ServiceConfig`] instances
//! - [`Scheme`]: `http` or `https`
//! - [`ServiceHost`]: A validated host with optional port
//! - [`BasePath`]: A validated base path
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use api_service::{ServiceConfig, ServiceHost, BasePath};
//!
//! let config = ServiceConfig::builder()
//!     .host(ServiceHost::new("www.flickr.com").unwrap())
//!     .base_path(BasePath::new("/services/rest").unwrap())
//!     .timeout(Duration::from_secs(15))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.endpoint_url(), "https://www.flickr.com/services/rest");
//! ```

mod newtypes;

pub use newtypes::{BasePath, Scheme, ServiceHost};

use std::time::Duration;

use crate::error::ConfigError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default settle delay before releasing a background extension after the
/// queue drains.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Endpoint and dispatch configuration for a [`ServiceClient`](crate::ServiceClient).
///
/// Set once at construction and immutable for the lifetime of the client.
///
/// # Thread Safety
///
/// `ServiceConfig` is `Clone`, `Send`, and `Sync`.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    scheme: Scheme,
    host: ServiceHost,
    base_path: BasePath,
    timeout: Duration,
    background_timeout: Duration,
    drain_grace: Duration,
    serialize_requests: bool,
    user_agent_prefix: Option<String>,
}

impl ServiceConfig {
    /// Creates a new builder for constructing a `ServiceConfig`.
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Returns the URL scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the backend host.
    #[must_use]
    pub const fn host(&self) -> &ServiceHost {
        &self.host
    }

    /// Returns the base path.
    #[must_use]
    pub const fn base_path(&self) -> &BasePath {
        &self.base_path
    }

    /// Returns the per-request transport timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the delay after entering the background before checking
    /// whether the extension is still needed.
    #[must_use]
    pub const fn background_timeout(&self) -> Duration {
        self.background_timeout
    }

    /// Returns the settle delay used after the queue drains in the background.
    #[must_use]
    pub const fn drain_grace(&self) -> Duration {
        self.drain_grace
    }

    /// Returns whether requests are serialized through the dispatch queue.
    #[must_use]
    pub const fn serialize_requests(&self) -> bool {
        self.serialize_requests
    }

    /// Returns the user agent prefix, if configured.
    #[must_use]
    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }

    /// Returns `scheme://host/base_path`, the prefix of every request URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme,
            self.host,
            self.base_path.as_ref()
        )
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::default(),
            host: ServiceHost::default(),
            base_path: BasePath::default(),
            timeout: DEFAULT_TIMEOUT,
            background_timeout: DEFAULT_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            serialize_requests: true,
            user_agent_prefix: None,
        }
    }
}

// Verify ServiceConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ServiceConfig>();
};

/// Builder for constructing [`ServiceConfig`] instances.
///
/// # Defaults
///
/// - `scheme`: `https`
/// - `host`: `localhost:8080`
/// - `base_path`: empty
/// - `timeout`: 30 seconds
/// - `background_timeout`: same as `timeout`
/// - `drain_grace`: 100 milliseconds
/// - `serialize_requests`: `true`
/// - `user_agent_prefix`: `None`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    scheme: Option<Scheme>,
    host: Option<ServiceHost>,
    base_path: Option<BasePath>,
    timeout: Option<Duration>,
    background_timeout: Option<Duration>,
    drain_grace: Option<Duration>,
    serialize_requests: Option<bool>,
    user_agent_prefix: Option<String>,
}

impl ServiceConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL scheme.
    #[must_use]
    pub const fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Sets the backend host.
    #[must_use]
    pub fn host(mut self, host: ServiceHost) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the base path.
    #[must_use]
    pub fn base_path(mut self, base_path: BasePath) -> Self {
        self.base_path = Some(base_path);
        self
    }

    /// Sets the per-request transport timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the background safety-check delay.
    ///
    /// Defaults to the request timeout so that a legitimately slow request
    /// is not raced by the check.
    #[must_use]
    pub const fn background_timeout(mut self, timeout: Duration) -> Self {
        self.background_timeout = Some(timeout);
        self
    }

    /// Sets the settle delay used after the queue drains in the background.
    #[must_use]
    pub const fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = Some(grace);
        self
    }

    /// Sets whether requests are serialized through the dispatch queue.
    ///
    /// When `false`, every request starts as soon as it is issued.
    #[must_use]
    pub const fn serialize_requests(mut self, serialize: bool) -> Self {
        self.serialize_requests = Some(serialize);
        self
    }

    /// Sets the user agent prefix for HTTP requests.
    #[must_use]
    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Builds the [`ServiceConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeout`] if `timeout` or
    /// `background_timeout` is zero.
    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        let defaults = ServiceConfig::default();

        let timeout = self.timeout.unwrap_or(defaults.timeout);
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout { field: "timeout" });
        }

        let background_timeout = self.background_timeout.unwrap_or(timeout);
        if background_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "background_timeout",
            });
        }

        Ok(ServiceConfig {
            scheme: self.scheme.unwrap_or(defaults.scheme),
            host: self.host.unwrap_or(defaults.host),
            base_path: self.base_path.unwrap_or(defaults.base_path),
            timeout,
            background_timeout,
            drain_grace: self.drain_grace.unwrap_or(defaults.drain_grace),
            serialize_requests: self
                .serialize_requests
                .unwrap_or(defaults.serialize_requests),
            user_agent_prefix: self.user_agent_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_provides_sensible_defaults() {
        let config = ServiceConfig::builder().build().unwrap();

        assert_eq!(config.scheme(), Scheme::Https);
        assert_eq!(config.host().as_ref(), "localhost:8080");
        assert_eq!(config.host().port(), Some(8080));
        assert_eq!(config.base_path().as_ref(), "");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.background_timeout(), Duration::from_secs(30));
        assert_eq!(config.drain_grace(), Duration::from_millis(100));
        assert!(config.serialize_requests());
        assert!(config.user_agent_prefix().is_none());
    }

    #[test]
    fn test_background_timeout_follows_request_timeout() {
        let config = ServiceConfig::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.background_timeout(), Duration::from_secs(5));

        let config = ServiceConfig::builder()
            .timeout(Duration::from_secs(5))
            .background_timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.background_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_builder_rejects_zero_timeouts() {
        let result = ServiceConfig::builder().timeout(Duration::ZERO).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTimeout { field: "timeout" })
        ));

        let result = ServiceConfig::builder()
            .background_timeout(Duration::ZERO)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTimeout {
                field: "background_timeout"
            })
        ));
    }

    #[test]
    fn test_endpoint_url_joins_parts() {
        let config = ServiceConfig::builder()
            .scheme(Scheme::Http)
            .host(ServiceHost::new("127.0.0.1:9000").unwrap())
            .base_path(BasePath::new("/v2/").unwrap())
            .build()
            .unwrap();

        assert_eq!(config.endpoint_url(), "http://127.0.0.1:9000/v2");
    }

    #[test]
    fn test_config_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ServiceConfig>();
    }
}
