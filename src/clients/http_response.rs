//! Response classification.
//!
//! A transport outcome is mapped to exactly one result:
//!
//! 1. A transport failure is returned unchanged as [`ServiceError::Transport`].
//! 2. A status outside `200..=399` becomes [`ServiceError::Status`]; the body
//!    is not inspected.
//! 3. Otherwise the body is decoded as JSON when requested (an empty body is
//!    `None`) or returned as raw bytes.
//!
//! Connectivity failures never reach this module: they are detected before
//! the request is sent.

use crate::clients::errors::{HttpStatusError, ServiceError, TransportError};

/// The raw result of a completed HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body as received.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Creates a response from a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` if the status is in the accepted range `200..=399`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status <= 399
    }
}

/// A successfully classified response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// The decoded JSON value; `None` for an empty body.
    Decoded(Option<serde_json::Value>),
    /// The body bytes, unmodified.
    Raw(Vec<u8>),
}

impl ResponseBody {
    /// Returns the decoded value, or `None` for a raw body.
    #[must_use]
    pub fn into_decoded(self) -> Option<serde_json::Value> {
        match self {
            Self::Decoded(value) => value,
            Self::Raw(_) => None,
        }
    }

    /// Returns the body bytes, re-encoding a decoded value if needed.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        match self {
            Self::Raw(bytes) => bytes,
            Self::Decoded(Some(value)) => value.to_string().into_bytes(),
            Self::Decoded(None) => Vec::new(),
        }
    }
}

/// Classifies one transport outcome.
///
/// # Errors
///
/// Returns [`ServiceError::Transport`] for a transport failure,
/// [`ServiceError::Status`] for a status outside `200..=399`, and
/// [`ServiceError::Decode`] for a body that is not valid JSON when `decode`
/// is set.
///
/// # Example
///
/// ```rust
/// use api_service::clients::{classify, ResponseBody, TransportResponse};
///
/// let body = classify(Ok(TransportResponse::new(201, br#"{"id":7}"#.to_vec())), true).unwrap();
/// assert_eq!(body, ResponseBody::Decoded(Some(serde_json::json!({"id": 7}))));
///
/// let error = classify(Ok(TransportResponse::new(404, Vec::new())), true).unwrap_err();
/// assert_eq!(error.status_code(), Some(404));
/// ```
pub fn classify(
    outcome: Result<TransportResponse, TransportError>,
    decode: bool,
) -> Result<ResponseBody, ServiceError> {
    let response = outcome?;

    if !response.is_ok() {
        return Err(HttpStatusError::from_code(response.status).into());
    }

    if !decode {
        return Ok(ResponseBody::Raw(response.body));
    }

    if response.body.is_empty() {
        return Ok(ResponseBody::Decoded(None));
    }

    let value = serde_json::from_slice(&response.body)?;
    Ok(ResponseBody::Decoded(Some(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::errors::TransportErrorKind;
    use serde_json::json;

    #[test]
    fn test_created_with_body_is_decoded() {
        let result = classify(Ok(TransportResponse::new(201, br#"{"a":1}"#.to_vec())), true);
        assert_eq!(
            result.unwrap(),
            ResponseBody::Decoded(Some(json!({"a": 1})))
        );
    }

    #[test]
    fn test_not_found_is_status_error() {
        let result = classify(
            Ok(TransportResponse::new(404, br#"{"error":"gone"}"#.to_vec())),
            true,
        );

        match result {
            Err(ServiceError::Status(e)) => {
                assert_eq!(e.code, 404);
                assert_eq!(e.reason, "Not Found");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_range_boundaries() {
        assert!(classify(Ok(TransportResponse::new(199, Vec::new())), false).is_err());
        assert!(classify(Ok(TransportResponse::new(200, Vec::new())), false).is_ok());
        assert!(classify(Ok(TransportResponse::new(304, Vec::new())), false).is_ok());
        assert!(classify(Ok(TransportResponse::new(399, Vec::new())), false).is_ok());
        assert!(classify(Ok(TransportResponse::new(400, Vec::new())), false).is_err());
    }

    #[test]
    fn test_error_status_body_is_not_parsed() {
        let result = classify(Ok(TransportResponse::new(500, b"<html>".to_vec())), true);
        assert!(matches!(result, Err(ServiceError::Status(_))));
    }

    #[test]
    fn test_empty_body_decodes_to_none() {
        let result = classify(Ok(TransportResponse::new(204, Vec::new())), true);
        assert_eq!(result.unwrap(), ResponseBody::Decoded(None));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let result = classify(Ok(TransportResponse::new(200, b"not json".to_vec())), true);
        assert!(matches!(result, Err(ServiceError::Decode(_))));
    }

    #[test]
    fn test_raw_body_is_untouched() {
        let bytes = b"\x00\xffnot json".to_vec();
        let result = classify(Ok(TransportResponse::new(200, bytes.clone())), false);
        assert_eq!(result.unwrap(), ResponseBody::Raw(bytes));
    }

    #[test]
    fn test_transport_error_passes_through() {
        let result = classify(
            Err(TransportError::new(TransportErrorKind::Connection, "reset")),
            true,
        );

        match result {
            Err(ServiceError::Transport(e)) => assert_eq!(e.kind, TransportErrorKind::Connection),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
