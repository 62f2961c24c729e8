//! The client facade.
//!
//! [`ServiceClient`] exposes verb-shaped async calls against one configured
//! backend. Every call is built into a [`PreparedRequest`], admitted through
//! the client's [`SerialQueue`], executed by its [`Transport`] on a spawned
//! task, and classified. The returned future resolves with the classified
//! result.
//!
//! # Ordering
//!
//! Requests are admitted synchronously on the first poll of the returned
//! future, before it ever yields. Futures polled in order (for example with
//! `tokio::join!`) are therefore executed in that order, one at a time.
//! [`ServiceClient::post_file`] reads the upload from disk first and is
//! admitted once the read completes.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::clients::errors::{ConnectivityError, ServiceError, TransportError};
use crate::clients::http_request::{PreparedRequest, RequestBuilder};
use crate::clients::http_response::{classify, ResponseBody};
use crate::clients::transport::{ReqwestTransport, Transport};
use crate::config::ServiceConfig;
use crate::dispatch::{
    AssumeReachable, BackgroundGuard, BackgroundScheduler, Dequeued, NoopScheduler,
    QueuedOperation, Reachability, SerialQueue, Ticket,
};
use crate::error::ConfigError;
use crate::tls::pinned_key_hash;

/// Crate version from Cargo.toml.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const AUTHORIZATION: &str = "Authorization";

/// Query or form parameters.
pub type Params = HashMap<String, String>;

/// Async client for one backend.
///
/// Cloning is cheap; clones share the queue, headers, and background guard.
///
/// # Thread Safety
///
/// `ServiceClient` is `Send + Sync`. Calls may be issued from any task or
/// thread inside the Tokio runtime the client was built in.
///
/// # Example
///
/// ```rust,ignore
/// use std::collections::HashMap;
/// use api_service::{ServiceClient, ServiceConfig, ServiceHost};
///
/// let config = ServiceConfig::builder()
///     .host(ServiceHost::new("api.example.com")?)
///     .build()?;
/// let client = ServiceClient::builder(config).token("secret").build()?;
///
/// let query = HashMap::from([("page".to_string(), "1".to_string())]);
/// let photos = client.get("photos", &query).await?;
/// ```
#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ServiceConfig,
    requests: RequestBuilder,
    headers: RwLock<Params>,
    queue: Arc<SerialQueue>,
    guard: BackgroundGuard,
    transport: Arc<dyn Transport>,
    reachability: Arc<dyn Reachability>,
    runtime: Handle,
}

// Verify ServiceClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ServiceClient>();
};

impl ServiceClient {
    /// Creates a client with default collaborators.
    ///
    /// # Errors
    ///
    /// See [`ServiceClientBuilder::build`].
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Creates a builder for a client using `config`.
    #[must_use]
    pub fn builder(config: ServiceConfig) -> ServiceClientBuilder {
        ServiceClientBuilder::new(config)
    }

    /// Returns the endpoint configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Returns a copy of the shared headers.
    #[must_use]
    pub fn headers(&self) -> Params {
        self.inner
            .headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets or clears the bearer token sent with every subsequent request.
    ///
    /// Requests already built keep the headers they were built with.
    pub fn set_authorization(&self, token: Option<&str>) {
        let mut headers = self
            .inner
            .headers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match token {
            Some(token) => {
                headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
            }
            None => {
                headers.remove(AUTHORIZATION);
            }
        }
    }

    /// Returns the number of outstanding queued requests, running one included.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.queue.len()
    }

    /// Returns `true` while a background extension is held.
    #[must_use]
    pub fn is_background_extended(&self) -> bool {
        self.inner.guard.is_extended()
    }

    /// Issues a GET and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails at any stage.
    pub async fn get(&self, path: &str, query: &Params) -> Result<Option<Value>, ServiceError> {
        let request = self.inner.requests.get(path, query, self.headers());
        self.dispatch(request).await.map(ResponseBody::into_decoded)
    }

    /// Issues a GET and returns the body bytes unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails at any stage.
    pub async fn get_raw(&self, path: &str, query: &Params) -> Result<Vec<u8>, ServiceError> {
        let mut request = self.inner.requests.get(path, query, self.headers());
        request.decode = false;
        self.dispatch(request).await.map(ResponseBody::into_raw)
    }

    /// Issues a POST with a JSON `body`, or with `query` form-encoded when no
    /// body is given.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] if `body` is not a JSON object,
    /// or any other [`ServiceError`] if the request fails.
    pub async fn post(
        &self,
        path: &str,
        query: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ServiceError> {
        let request = self
            .inner
            .requests
            .post(path, query, body, self.headers())?;
        self.dispatch(request).await.map(ResponseBody::into_decoded)
    }

    /// Uploads a local file as a multipart POST.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] without touching the network if
    /// `file` is not an existing regular file, or any other [`ServiceError`]
    /// if the request fails.
    pub async fn post_file(
        &self,
        path: &str,
        file: impl AsRef<Path>,
    ) -> Result<Option<Value>, ServiceError> {
        let request = self
            .inner
            .requests
            .upload(path, file.as_ref(), self.headers())
            .await?;
        self.dispatch(request).await.map(ResponseBody::into_decoded)
    }

    /// Issues a PUT with `query` on the URL and an optional JSON `body`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] if `body` is not a JSON object,
    /// or any other [`ServiceError`] if the request fails.
    pub async fn put(
        &self,
        path: &str,
        query: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ServiceError> {
        let request = self
            .inner
            .requests
            .put(path, query, body, self.headers())?;
        self.dispatch(request).await.map(ResponseBody::into_decoded)
    }

    /// Issues a DELETE. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails at any stage.
    pub async fn delete(&self, path: &str, query: Option<&Params>) -> Result<(), ServiceError> {
        let request = self.inner.requests.delete(path, query, self.headers());
        self.dispatch(request).await.map(|_| ())
    }

    /// Cancels the running request only; queued requests stay queued.
    pub fn cancel_pending(&self) {
        self.inner.queue.cancel_pending();
    }

    /// Cancels every outstanding request and empties the queue.
    pub fn cancel_all(&self) {
        // The cancelled head's own dequeue finds its ticket gone, so the
        // drain is reported here.
        if self.inner.queue.cancel_all() > 0 {
            self.inner.guard.queue_drained();
        }
    }

    /// Notifies the client that the host application left the foreground.
    pub fn did_enter_background(&self) {
        self.inner.guard.did_enter_background();
    }

    /// Notifies the client that the host application is returning to the
    /// foreground.
    pub fn will_enter_foreground(&self) {
        self.inner.guard.will_enter_foreground();
    }

    /// Notifies the client that the host revoked its background extension.
    pub fn background_expired(&self) {
        self.inner.guard.extension_expired();
    }

    /// Admits `request` and waits for its classified result.
    ///
    /// Everything up to the admission runs before the first `.await`.
    async fn dispatch(&self, request: PreparedRequest) -> Result<ResponseBody, ServiceError> {
        let host = self.inner.config.host();
        if !self.inner.reachability.is_reachable(host) {
            return Err(ConnectivityError {
                host: host.to_string(),
            }
            .into());
        }

        if let Some(body) = request.body.as_deref() {
            if let Ok(text) = std::str::from_utf8(body) {
                tracing::trace!("{} {} body: {}", request.method, request.url, text);
            }
        }

        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        if self.inner.config.serialize_requests() {
            let (start_tx, start_rx) = oneshot::channel();
            let operation = Arc::new(RequestOperation {
                description: format!("{} {}", request.method, request.url),
                start: Mutex::new(Some(start_tx)),
                cancel: Mutex::new(Some(cancel_tx)),
            });

            self.inner.runtime.spawn(run_request(
                Arc::clone(&self.inner),
                request,
                Admission::Queued(start_rx),
                cancel_rx,
                result_tx,
            ));
            self.inner.queue.enqueue(operation);
        } else {
            tracing::debug!("Starting {} {}", request.method, request.url);
            self.inner.runtime.spawn(run_request(
                Arc::clone(&self.inner),
                request,
                Admission::Immediate(cancel_tx),
                cancel_rx,
                result_tx,
            ));
        }

        result_rx
            .await
            .unwrap_or_else(|_| Err(TransportError::cancelled().into()))
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("config", &self.inner.config)
            .field("queue", &self.inner.queue)
            .field("guard", &self.inner.guard)
            .finish_non_exhaustive()
    }
}

/// How a spawned request gets permission to run.
enum Admission {
    /// Wait for the queue to start it.
    Queued(oneshot::Receiver<Ticket>),
    /// Run now. Holds the cancel sender so the request is never cancelled.
    Immediate(oneshot::Sender<()>),
}

/// Queue entry for one request. Signals its task through one-shot channels.
struct RequestOperation {
    description: String,
    start: Mutex<Option<oneshot::Sender<Ticket>>>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl QueuedOperation for RequestOperation {
    fn start(&self, ticket: Ticket) {
        let sender = self
            .start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(ticket);
        }
    }

    fn cancel(&self) {
        let sender = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Body of the task spawned for each request.
///
/// A cancel signal, or the queue dropping the operation unstarted, ends the
/// request with a cancellation error.
async fn run_request(
    inner: Arc<ClientInner>,
    request: PreparedRequest,
    admission: Admission,
    mut cancel_rx: oneshot::Receiver<()>,
    result_tx: oneshot::Sender<Result<ResponseBody, ServiceError>>,
) {
    let (ticket, _keep_alive) = match admission {
        Admission::Queued(mut start_rx) => {
            let started = tokio::select! {
                biased;
                _ = &mut cancel_rx => None,
                ticket = &mut start_rx => Some(ticket),
            };
            match started {
                Some(Ok(ticket)) => (Some(ticket), None),
                Some(Err(_)) => {
                    let _ = result_tx.send(Err(TransportError::cancelled().into()));
                    return;
                }
                None => {
                    let _ = result_tx.send(Err(TransportError::cancelled().into()));
                    // A cancelled head may have been started before this task
                    // saw it. It still owns the head slot until it dequeues.
                    // Operations removed by `cancel_all` drop their start
                    // sender, so this never waits on an unstarted request.
                    if let Ok(ticket) = start_rx.await {
                        complete(&inner, ticket);
                    }
                    return;
                }
            }
        }
        Admission::Immediate(cancel_tx) => (None, Some(cancel_tx)),
    };

    let decode = request.decode;
    let outcome = tokio::select! {
        biased;
        _ = &mut cancel_rx => Err(TransportError::cancelled()),
        outcome = inner.transport.execute(request) => outcome,
    };

    let _ = result_tx.send(classify(outcome, decode));

    if let Some(ticket) = ticket {
        complete(&inner, ticket);
    }
}

/// Removes a finished request from the queue, starting the next one.
fn complete(inner: &ClientInner, ticket: Ticket) {
    if inner.queue.dequeue(ticket) == Dequeued::Drained {
        inner.guard.queue_drained();
    }
}

/// Builder for [`ServiceClient`].
///
/// # Defaults
///
/// - `token`: none
/// - `transport`: [`ReqwestTransport`], pinned when a process-wide pin is set
/// - `reachability`: [`AssumeReachable`]
/// - `background_scheduler`: [`NoopScheduler`]
pub struct ServiceClientBuilder {
    config: ServiceConfig,
    token: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    reachability: Option<Arc<dyn Reachability>>,
    scheduler: Option<Arc<dyn BackgroundScheduler>>,
}

impl ServiceClientBuilder {
    /// Creates a builder for `config`.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            token: None,
            transport: None,
            reachability: None,
            scheduler: None,
        }
    }

    /// Sets the initial bearer token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Replaces the HTTP transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the reachability probe.
    #[must_use]
    pub fn reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Sets the host's background scheduler.
    #[must_use]
    pub fn background_scheduler(mut self, scheduler: Arc<dyn BackgroundScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Builds the client.
    ///
    /// Must be called from within a Tokio runtime; request tasks and
    /// background timers are spawned on it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRuntime`] outside a Tokio runtime and
    /// [`ConfigError::Transport`] if the default transport cannot be created.
    pub fn build(self) -> Result<ServiceClient, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(pinned_key_hash())?),
        };

        let mut headers = default_headers(&self.config);
        if let Some(token) = &self.token {
            headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
        }

        let queue = Arc::new(SerialQueue::new());
        let guard = BackgroundGuard::new(
            self.config.endpoint_url(),
            self.scheduler.unwrap_or_else(|| Arc::new(NoopScheduler)),
            Arc::clone(&queue),
            runtime.clone(),
            self.config.background_timeout(),
            self.config.drain_grace(),
        );

        tracing::debug!(
            "Created service client for {} (serialized: {})",
            self.config.endpoint_url(),
            self.config.serialize_requests()
        );

        Ok(ServiceClient {
            inner: Arc::new(ClientInner {
                requests: RequestBuilder::new(&self.config),
                config: self.config,
                headers: RwLock::new(headers),
                queue,
                guard,
                transport,
                reachability: self
                    .reachability
                    .unwrap_or_else(|| Arc::new(AssumeReachable)),
                runtime,
            }),
        })
    }
}

impl fmt::Debug for ServiceClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClientBuilder")
            .field("config", &self.config)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

fn default_headers(config: &ServiceConfig) -> Params {
    let user_agent_prefix = config
        .user_agent_prefix()
        .map_or(String::new(), |prefix| format!("{prefix} | "));
    let rust_version = env!("CARGO_PKG_RUST_VERSION");
    let user_agent =
        format!("{user_agent_prefix}api-service-rust v{SDK_VERSION} | Rust {rust_version}");

    HashMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Cache-Control".to_string(), "No-Cache".to_string()),
        ("Accept".to_string(), "*/*".to_string()),
        ("User-Agent".to_string(), user_agent),
    ])
}
