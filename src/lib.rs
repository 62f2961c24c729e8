//! # API Service
//!
//! A client-side dispatcher for a single HTTP backend. Requests are issued
//! through an async facade, executed strictly one at a time in the order they
//! were issued, and classified into a decoded body or a typed error.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe endpoint configuration via [`ServiceConfig`] and [`ServiceConfigBuilder`]
//! - An async client facade, [`ServiceClient`], with GET, POST, multipart upload,
//!   PUT, and DELETE calls
//! - FIFO admission with one request in flight via [`dispatch::SerialQueue`]
//! - Cancellation of the running request or of everything outstanding
//! - Cooperation with a host application's background lifecycle via
//!   [`dispatch::BackgroundGuard`]
//! - Optional public key pinning for every TLS handshake via [`tls`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use api_service::{ServiceConfig, ServiceHost, BasePath, Scheme};
//!
//! let config = ServiceConfig::builder()
//!     .scheme(Scheme::Https)
//!     .host(ServiceHost::new("api.example.com").unwrap())
//!     .base_path(BasePath::new("/v1").unwrap())
//!     .timeout(Duration::from_secs(20))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.endpoint_url(), "https://api.example.com/v1");
//! ```
//!
//! ## Issuing Requests
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use serde_json::json;
//! use api_service::{ServiceClient, ServiceConfig};
//!
//! let client = ServiceClient::builder(config).token("secret").build()?;
//!
//! let query = HashMap::from([("tag".to_string(), "alps".to_string())]);
//! let photos = client.get("photos", &query).await?;
//!
//! client.put("photos/7", None, Some(&json!({"title": "Matterhorn"}))).await?;
//! client.post_file("uploads", "/tmp/IMG_0001.jpg").await?;
//! ```
//!
//! ## Public Key Pinning
//!
//! Install the pin once, before building any client:
//!
//! ```rust,ignore
//! api_service::set_pinned_key_hash("7MVxoU+F/uh++K5IP064Q+xIiUEzA0UeOAgngccaxp4=")?;
//! let client = ServiceClient::new(config)?; // every handshake is now pinned
//! ```
//!
//! ## Background Lifecycle
//!
//! Hosts that suspend the process forward their lifecycle events:
//!
//! ```rust,ignore
//! let client = ServiceClient::builder(config)
//!     .background_scheduler(Arc::new(MyScheduler))
//!     .build()?;
//!
//! client.did_enter_background();  // on suspension notice
//! client.will_enter_foreground(); // on resume
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber.
//!
//! ## Thread Safety
//!
//! All public types are `Send + Sync`.

pub mod clients;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod tls;

// Re-export public types at crate root for convenience
pub use clients::{
    HttpStatusError, InvalidRequestError, Params, ServiceClient, ServiceClientBuilder,
    ServiceError, TransportError, TransportErrorKind,
};
pub use config::{BasePath, Scheme, ServiceConfig, ServiceConfigBuilder, ServiceHost};
pub use error::ConfigError;
pub use tls::set_pinned_key_hash;
