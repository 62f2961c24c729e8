//! Network reachability probe consulted before each request.

use crate::config::ServiceHost;

/// Reports whether the backend host can currently be reached.
///
/// A `false` answer fails the request with
/// [`ServiceError::Connectivity`](crate::clients::ServiceError::Connectivity)
/// before any network access. Hosts that cannot tell should answer `true`.
pub trait Reachability: Send + Sync {
    /// Returns `false` only if `host` is known to be unreachable.
    fn is_reachable(&self, host: &ServiceHost) -> bool;
}

/// The default probe. Always reachable; failures surface from the transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumeReachable;

impl Reachability for AssumeReachable {
    fn is_reachable(&self, _host: &ServiceHost) -> bool {
        true
    }
}
