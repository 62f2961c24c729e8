//! Transport trust: certificate chain validation and public key pinning.
//!
//! When a pinned key hash is configured (see [`set_pinned_key_hash`]), every
//! TLS handshake made by a [`ServiceClient`](crate::ServiceClient) runs
//! through a [`TrustValidator`]:
//!
//! 1. The chain is evaluated by a [`ChainEvaluator`] (by default
//!    [`WebPkiChainEvaluator`] over the Mozilla roots).
//! 2. The leaf public key is hashed with [`public_key_hash`] and compared to
//!    the pin.
//!
//! Any failure aborts the handshake. Without a pin only step 1 applies.

mod pinning;
mod verifier;

pub use pinning::{
    pinned_key_hash, public_key_hash, set_pinned_key_hash, PinnedKeyHash, RSA2048_SPKI_HEADER,
};
pub use verifier::{
    leaf_public_key, pinned_client_config, webpki_root_store, ChainEvaluator, PinningVerifier,
    TrustError, TrustValidator, WebPkiChainEvaluator,
};
