//! The transport seam between dispatch and the network.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::clients::errors::TransportError;
use crate::clients::http_request::{HttpMethod, PreparedRequest};
use crate::clients::http_response::TransportResponse;
use crate::error::ConfigError;
use crate::tls::{pinned_client_config, PinnedKeyHash, TrustValidator, WebPkiChainEvaluator};

/// Future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// Performs one HTTP exchange.
///
/// Implementations honour `request.timeout` and report every failure as a
/// [`TransportError`]. Dropping the returned future aborts the exchange.
pub trait Transport: Send + Sync {
    /// Sends `request` and collects the full response.
    fn execute(&self, request: PreparedRequest) -> TransportFuture<'_>;
}

/// [`Transport`] backed by a `reqwest` client over rustls.
///
/// When a pinned key hash is supplied, every handshake runs through a
/// [`TrustValidator`] with that pin.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    pinned: bool,
}

// Verify ReqwestTransport is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ReqwestTransport>();
};

impl ReqwestTransport {
    /// Creates a transport, pinning the server key when `pin` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Transport`] if the HTTP client cannot be
    /// created.
    pub fn new(pin: Option<&PinnedKeyHash>) -> Result<Self, ConfigError> {
        let builder = reqwest::Client::builder().gzip(true).deflate(true);

        let builder = match pin {
            Some(pin) => {
                let validator = TrustValidator::new(
                    Some(pin.clone()),
                    Arc::new(WebPkiChainEvaluator::with_webpki_roots()),
                );
                builder.use_preconfigured_tls(pinned_client_config(validator))
            }
            None => builder.use_rustls_tls(),
        };

        let client = builder.build().map_err(|e| ConfigError::Transport {
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            pinned: pin.is_some(),
        })
    }

    /// Returns `true` if server keys are pinned.
    #[must_use]
    pub const fn is_pinned(&self) -> bool {
        self.pinned
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(reqwest_method(request.method), &request.url)
                .timeout(request.timeout);

            for (key, value) in &request.headers {
                builder = builder.header(key, value);
            }

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();

            Ok(TransportResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::errors::TransportErrorKind;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_transport_without_pin() {
        let transport = ReqwestTransport::new(None).unwrap();
        assert!(!transport.is_pinned());
    }

    #[test]
    fn test_transport_with_pin() {
        let pin = PinnedKeyHash::new(crate::tls::public_key_hash(b"key")).unwrap();
        let transport = ReqwestTransport::new(Some(&pin)).unwrap();
        assert!(transport.is_pinned());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        // Bind then drop a listener to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = ReqwestTransport::new(None).unwrap();
        let request = PreparedRequest {
            method: HttpMethod::Get,
            url: format!("http://127.0.0.1:{port}/status"),
            headers: HashMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
            decode: true,
        };

        let error = transport.execute(request).await.unwrap_err();
        assert_eq!(error.kind, TransportErrorKind::Connection);
    }
}
