//! Background execution guard.
//!
//! When the host application leaves the foreground it may be suspended, which
//! would silently kill in-flight requests. The guard asks the host for a
//! bounded amount of extra execution time (an extension) and hands it back as
//! soon as the work is done.
//!
//! The guard has two states. It is *Extended* while it holds an
//! [`ExtensionToken`] and *Inactive* otherwise. An extension is released when
//! any of the following happens first:
//!
//! - the queue drains while extended (after a short settle delay),
//! - the safety check scheduled `background_timeout` after backgrounding finds
//!   the queue empty,
//! - the application returns to the foreground,
//! - the host reports that the extension expired.
//!
//! Every granted token is ended exactly once. The guard never cancels
//! requests.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::dispatch::queue::SerialQueue;

/// Opaque handle for one granted background extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExtensionToken(u64);

impl ExtensionToken {
    /// Wraps a host-specific identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the host-specific identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// The host's facility for granting extra execution time.
///
/// Implementations must not call back into the guard from these methods.
pub trait BackgroundScheduler: Send + Sync {
    /// Requests an extension labelled `name`. Returns `None` if the host
    /// declines.
    fn begin_extension(&self, name: &str) -> Option<ExtensionToken>;

    /// Releases a previously granted extension.
    fn end_extension(&self, token: ExtensionToken);
}

/// A scheduler for hosts without a suspension model. Never grants anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopScheduler;

impl BackgroundScheduler for NoopScheduler {
    fn begin_extension(&self, _name: &str) -> Option<ExtensionToken> {
        None
    }

    fn end_extension(&self, _token: ExtensionToken) {}
}

#[derive(Debug, Default)]
struct GuardState {
    token: Option<ExtensionToken>,
    // Bumped on every grant so that timers from an earlier extension cannot
    // release a later one.
    generation: u64,
}

struct GuardInner {
    name: String,
    scheduler: Arc<dyn BackgroundScheduler>,
    queue: Arc<SerialQueue>,
    runtime: Handle,
    background_timeout: Duration,
    drain_grace: Duration,
    state: Mutex<GuardState>,
}

/// Holds at most one background extension on behalf of a client.
///
/// Cloning is cheap and every clone refers to the same guard.
#[derive(Clone)]
pub struct BackgroundGuard {
    inner: Arc<GuardInner>,
}

impl BackgroundGuard {
    /// Creates an inactive guard watching `queue`.
    ///
    /// `name` labels extensions requested from the scheduler. Timers are
    /// spawned on `runtime`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        scheduler: Arc<dyn BackgroundScheduler>,
        queue: Arc<SerialQueue>,
        runtime: Handle,
        background_timeout: Duration,
        drain_grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                name: name.into(),
                scheduler,
                queue,
                runtime,
                background_timeout,
                drain_grace,
                state: Mutex::new(GuardState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` while an extension is held.
    #[must_use]
    pub fn is_extended(&self) -> bool {
        self.lock().token.is_some()
    }

    /// The application left the foreground.
    ///
    /// Requests an extension unless one is already held, then schedules the
    /// safety check.
    pub fn did_enter_background(&self) {
        let generation = {
            let mut state = self.lock();
            if state.token.is_some() {
                return;
            }

            let Some(token) = self.inner.scheduler.begin_extension(&self.inner.name) else {
                tracing::debug!("Background extension for {} was declined", self.inner.name);
                return;
            };

            state.generation += 1;
            state.token = Some(token);
            tracing::debug!(
                "Began background extension {} for {} ({} requests outstanding)",
                token.id(),
                self.inner.name,
                self.inner.queue.len()
            );
            state.generation
        };

        self.release_later(generation, self.inner.background_timeout, "safety check");
    }

    /// The queue just became empty.
    ///
    /// If extended, releases the extension after the settle delay provided the
    /// queue is still empty then.
    pub fn queue_drained(&self) {
        let generation = {
            let state = self.lock();
            if state.token.is_none() {
                return;
            }
            state.generation
        };

        self.release_later(generation, self.inner.drain_grace, "queue drained");
    }

    /// The application returned to the foreground.
    pub fn will_enter_foreground(&self) {
        self.release("returned to foreground");
    }

    /// The host reports that the extension ran out of time.
    pub fn extension_expired(&self) {
        self.release("extension expired");
    }

    fn release(&self, reason: &str) {
        let token = self.lock().token.take();

        if let Some(token) = token {
            tracing::debug!("Ending background extension {}: {}", token.id(), reason);
            self.inner.scheduler.end_extension(token);
        }
    }

    fn release_if_idle(&self, generation: u64, reason: &str) {
        let token = {
            let mut state = self.lock();
            if state.generation != generation || !self.inner.queue.is_empty() {
                return;
            }
            state.token.take()
        };

        if let Some(token) = token {
            tracing::debug!("Ending background extension {}: {}", token.id(), reason);
            self.inner.scheduler.end_extension(token);
        }
    }

    fn release_later(&self, generation: u64, delay: Duration, reason: &'static str) {
        let guard = self.clone();
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            guard.release_if_idle(generation, reason);
        });
    }
}

impl fmt::Debug for BackgroundGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundGuard")
            .field("name", &self.inner.name)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

// Verify BackgroundGuard is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<BackgroundGuard>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::queue::{QueuedOperation, Ticket};
    use std::sync::atomic::{AtomicU64, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(30);
    const GRACE: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct RecordingScheduler {
        next: AtomicU64,
        begun: Mutex<Vec<(String, ExtensionToken)>>,
        ended: Mutex<Vec<ExtensionToken>>,
    }

    impl RecordingScheduler {
        fn begun(&self) -> usize {
            self.begun.lock().unwrap().len()
        }

        fn ended(&self) -> Vec<ExtensionToken> {
            self.ended.lock().unwrap().clone()
        }
    }

    impl BackgroundScheduler for RecordingScheduler {
        fn begin_extension(&self, name: &str) -> Option<ExtensionToken> {
            let token = ExtensionToken::new(self.next.fetch_add(1, Ordering::SeqCst) + 1);
            self.begun.lock().unwrap().push((name.to_string(), token));
            Some(token)
        }

        fn end_extension(&self, token: ExtensionToken) {
            self.ended.lock().unwrap().push(token);
        }
    }

    struct Idle;

    impl QueuedOperation for Idle {
        fn start(&self, _ticket: Ticket) {}
        fn cancel(&self) {}
    }

    fn guard(scheduler: &Arc<RecordingScheduler>, queue: &Arc<SerialQueue>) -> BackgroundGuard {
        BackgroundGuard::new(
            "https://api.example.com/v1",
            Arc::clone(scheduler) as Arc<dyn BackgroundScheduler>,
            Arc::clone(queue),
            Handle::current(),
            TIMEOUT,
            GRACE,
        )
    }

    async fn advance(by: Duration) {
        tokio::time::sleep(by).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_background_begins_named_extension() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        guard.did_enter_background();

        assert!(guard.is_extended());
        let begun = scheduler.begun.lock().unwrap().clone();
        assert_eq!(begun.len(), 1);
        assert_eq!(begun[0].0, "https://api.example.com/v1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentering_background_while_extended_is_noop() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        guard.did_enter_background();
        guard.did_enter_background();

        assert_eq!(scheduler.begun(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_check_releases_idle_extension_once() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        guard.did_enter_background();
        advance(TIMEOUT - Duration::from_secs(1)).await;
        assert!(guard.is_extended());

        advance(Duration::from_secs(2)).await;
        assert!(!guard.is_extended());
        assert_eq!(scheduler.ended().len(), 1);

        // Nothing else may end it again.
        guard.will_enter_foreground();
        guard.extension_expired();
        advance(TIMEOUT).await;
        assert_eq!(scheduler.ended().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_check_keeps_extension_while_busy() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        let ticket = queue.enqueue(Arc::new(Idle));
        guard.did_enter_background();
        advance(TIMEOUT + Duration::from_secs(1)).await;

        assert!(guard.is_extended());
        assert!(scheduler.ended().is_empty());

        // The drain releases it after the grace period.
        queue.dequeue(ticket);
        guard.queue_drained();
        advance(GRACE / 2).await;
        assert!(guard.is_extended());

        advance(GRACE).await;
        assert!(!guard.is_extended());
        assert_eq!(scheduler.ended().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_ignored_if_new_work_arrives() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        let ticket = queue.enqueue(Arc::new(Idle));
        guard.did_enter_background();

        queue.dequeue(ticket);
        guard.queue_drained();
        queue.enqueue(Arc::new(Idle));

        advance(GRACE * 2).await;
        assert!(guard.is_extended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_while_inactive_does_nothing() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        guard.queue_drained();
        advance(GRACE * 2).await;

        assert_eq!(scheduler.begun(), 0);
        assert!(scheduler.ended().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_releases_and_stale_timer_is_ignored() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        guard.did_enter_background();
        guard.will_enter_foreground();
        assert_eq!(scheduler.ended().len(), 1);

        // Back to the background shortly before the first safety check fires.
        advance(TIMEOUT - Duration::from_secs(5)).await;
        queue.enqueue(Arc::new(Idle));
        guard.did_enter_background();
        assert_eq!(scheduler.begun(), 2);

        advance(Duration::from_secs(10)).await;
        assert!(guard.is_extended());
        assert_eq!(scheduler.ended().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_releases_extension() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let queue = Arc::new(SerialQueue::new());
        let guard = guard(&scheduler, &queue);

        guard.did_enter_background();
        let token = scheduler.begun.lock().unwrap()[0].1;

        guard.extension_expired();

        assert_eq!(scheduler.ended(), vec![token]);
        assert!(!guard.is_extended());
    }

    #[tokio::test]
    async fn test_noop_scheduler_never_extends() {
        let queue = Arc::new(SerialQueue::new());
        let guard = BackgroundGuard::new(
            "noop",
            Arc::new(NoopScheduler),
            queue,
            Handle::current(),
            TIMEOUT,
            GRACE,
        );

        guard.did_enter_background();
        assert!(!guard.is_extended());
        guard.will_enter_foreground();
    }
}
