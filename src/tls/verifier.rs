//! Server trust evaluation for the pinned connection.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::{Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use thiserror::Error;

use crate::tls::pinning::PinnedKeyHash;

/// Why a server identity was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// The server did not present a leaf certificate.
    #[error("Server presented no certificate.")]
    MissingCertificate,

    /// The leaf certificate could not be parsed for its public key.
    #[error("Could not extract the server public key: {0}")]
    KeyExtraction(String),

    /// Standard chain-of-trust evaluation failed.
    #[error("Certificate chain rejected: {0}")]
    ChainRejected(String),

    /// The leaf public key does not hash to the pinned value.
    #[error("Server public key does not match the pinned key hash.")]
    PinMismatch,
}

/// Platform chain-of-trust evaluation.
///
/// Implementations decide whether `end_entity` chains to a trusted root for
/// `server_name` at `now`. Pinning is layered on top by [`TrustValidator`].
pub trait ChainEvaluator: Send + Sync {
    /// Evaluates the offered chain.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::ChainRejected`] if the chain is not trusted.
    fn evaluate(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        now: SystemTime,
    ) -> Result<(), TrustError>;
}

/// Chain evaluation backed by rustls' webpki verifier.
pub struct WebPkiChainEvaluator {
    verifier: WebPkiVerifier,
}

impl WebPkiChainEvaluator {
    /// Creates an evaluator trusting the given roots.
    #[must_use]
    pub fn new(roots: RootCertStore) -> Self {
        Self {
            verifier: WebPkiVerifier::new(roots, None),
        }
    }

    /// Creates an evaluator trusting the Mozilla root program.
    #[must_use]
    pub fn with_webpki_roots() -> Self {
        Self::new(webpki_root_store())
    }
}

impl fmt::Debug for WebPkiChainEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebPkiChainEvaluator")
    }
}

impl ChainEvaluator for WebPkiChainEvaluator {
    fn evaluate(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        now: SystemTime,
    ) -> Result<(), TrustError> {
        self.verifier
            .verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                &mut std::iter::empty(),
                &[],
                now,
            )
            .map(|_| ())
            .map_err(|e| TrustError::ChainRejected(e.to_string()))
    }
}

/// Returns a root store holding the bundled Mozilla roots.
#[must_use]
pub fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    roots
}

/// Extracts the raw public key bits from a DER certificate.
///
/// For RSA this is the PKCS#1 `RSAPublicKey` carried in the
/// `subjectPublicKey` bit string.
///
/// # Errors
///
/// Returns [`TrustError::MissingCertificate`] for an empty input and
/// [`TrustError::KeyExtraction`] if the certificate cannot be parsed.
pub fn leaf_public_key(der: &[u8]) -> Result<Vec<u8>, TrustError> {
    if der.is_empty() {
        return Err(TrustError::MissingCertificate);
    }

    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| TrustError::KeyExtraction(e.to_string()))?;

    let key = cert.public_key().subject_public_key.data.to_vec();
    if key.is_empty() {
        return Err(TrustError::KeyExtraction("empty public key".to_string()));
    }
    Ok(key)
}

/// Decides whether a server identity is acceptable.
///
/// Chain evaluation always runs first; when a pin is configured the leaf
/// public key must additionally hash to it. There is no partial-trust
/// fallback.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use api_service::tls::{TrustValidator, WebPkiChainEvaluator, PinnedKeyHash};
///
/// let validator = TrustValidator::new(
///     Some(PinnedKeyHash::new("7MVxoU+F/uh++K5IP064Q+xIiUEzA0UeOAgngccaxp4=")?),
///     Arc::new(WebPkiChainEvaluator::with_webpki_roots()),
/// );
/// validator.validate(&leaf, &[], &server_name, SystemTime::now())?;
/// ```
#[derive(Clone)]
pub struct TrustValidator {
    pin: Option<PinnedKeyHash>,
    chain: Arc<dyn ChainEvaluator>,
}

impl TrustValidator {
    /// Creates a validator from an optional pin and a chain evaluator.
    #[must_use]
    pub fn new(pin: Option<PinnedKeyHash>, chain: Arc<dyn ChainEvaluator>) -> Self {
        Self { pin, chain }
    }

    /// Returns the configured pin.
    #[must_use]
    pub const fn pin(&self) -> Option<&PinnedKeyHash> {
        self.pin.as_ref()
    }

    /// Validates one handshake's offered chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TrustError`] encountered.
    pub fn validate(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        now: SystemTime,
    ) -> Result<(), TrustError> {
        if end_entity.0.is_empty() {
            return Err(TrustError::MissingCertificate);
        }

        self.chain
            .evaluate(end_entity, intermediates, server_name, now)?;

        let Some(pin) = &self.pin else {
            return Ok(());
        };

        let key = leaf_public_key(&end_entity.0)?;
        if pin.matches(&key) {
            Ok(())
        } else {
            Err(TrustError::PinMismatch)
        }
    }
}

impl fmt::Debug for TrustValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustValidator")
            .field("pin", &self.pin)
            .finish_non_exhaustive()
    }
}

/// rustls hook running a [`TrustValidator`] during every handshake.
#[derive(Debug)]
pub struct PinningVerifier {
    validator: TrustValidator,
}

impl PinningVerifier {
    /// Wraps a validator.
    #[must_use]
    pub const fn new(validator: TrustValidator) -> Self {
        Self { validator }
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .validator
            .validate(end_entity, intermediates, server_name, now)
        {
            Ok(()) => Ok(ServerCertVerified::assertion()),
            Err(e) => {
                tracing::warn!("Rejecting server identity for {:?}: {}", server_name, e);
                Err(rustls::Error::General(e.to_string()))
            }
        }
    }
}

/// Builds a rustls client configuration that validates through `validator`.
#[must_use]
pub fn pinned_client_config(validator: TrustValidator) -> ClientConfig {
    ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(PinningVerifier::new(validator)))
        .with_no_client_auth()
}
