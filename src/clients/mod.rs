//! HTTP client types for the API service.
//!
//! This module provides the request pipeline: building requests, sending
//! them through a [`Transport`], and classifying the outcome.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`ServiceClient`]: The async client facade with verb-shaped calls
//! - [`ServiceClientBuilder`]: Builder for injecting collaborators
//! - [`RequestBuilder`]: Turns logical calls into [`PreparedRequest`]s
//! - [`Transport`]: The network seam, implemented by [`ReqwestTransport`]
//! - [`classify`]: Maps transport outcomes to [`ResponseBody`] or [`ServiceError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use api_service::{ServiceClient, ServiceConfig};
//!
//! let client = ServiceClient::new(ServiceConfig::default())?;
//! client.set_authorization(Some("token"));
//!
//! let created = client.post("photos", None, Some(&json!({"title": "Dune"}))).await?;
//! client.delete("photos/42", None).await?;
//! ```

mod errors;
mod http_request;
mod http_response;
mod service_client;
mod transport;

pub use errors::{
    ConnectivityError, HttpStatusError, InvalidRequestError, ServiceError, TransportError,
    TransportErrorKind,
};
pub use http_request::{
    detect_mime, encode_form, encode_json_body, encode_multipart, encode_query, HttpMethod,
    PreparedRequest, RequestBuilder, CONTENT_TYPE,
};
pub use http_response::{classify, ResponseBody, TransportResponse};
pub use service_client::{Params, ServiceClient, ServiceClientBuilder, SDK_VERSION};
pub use transport::{ReqwestTransport, Transport, TransportFuture};
