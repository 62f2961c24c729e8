//! Serial dispatch queue.
//!
//! The queue owns the ordered list of outstanding operations and lets at most
//! one of them run at a time. Operations are started in enqueue order; each
//! operation reports its own completion with [`SerialQueue::dequeue`], which
//! starts the next one.
//!
//! A single mutex guards the list. It is held only while the list is
//! mutated: operations are started and cancelled after the lock is released,
//! so an operation that completes synchronously, or a completion path that
//! enqueues more work, cannot deadlock the queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Identifies one enqueued operation.
///
/// Tickets are handed out in strictly increasing order, so comparing two
/// tickets compares their enqueue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An operation that can be held by a [`SerialQueue`].
///
/// Both methods are called without the queue lock held and must not block.
pub trait QueuedOperation: Send + Sync {
    /// Begins executing. Called exactly once, when the operation reaches the
    /// head of the queue. The operation must eventually call
    /// [`SerialQueue::dequeue`] with `ticket` unless it was removed by
    /// [`SerialQueue::cancel_all`].
    fn start(&self, ticket: Ticket);

    /// Asks the operation to abort.
    fn cancel(&self);

    /// Short human-readable description used in logs.
    fn describe(&self) -> String {
        String::from("operation")
    }
}

struct Entry {
    ticket: Ticket,
    operation: Arc<dyn QueuedOperation>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    next_ticket: u64,
    head_started_at: Option<Instant>,
}

/// What [`SerialQueue::dequeue`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dequeued {
    /// The head was removed and another operation is now running.
    Advanced,
    /// The head was removed and the queue is now empty.
    Drained,
    /// The ticket was not at the head (for example after `cancel_all`), so
    /// nothing changed.
    Stale,
}

/// FIFO admission control allowing one running operation.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use api_service::dispatch::{QueuedOperation, SerialQueue, Ticket};
///
/// struct Noop;
/// impl QueuedOperation for Noop {
///     fn start(&self, _ticket: Ticket) {}
///     fn cancel(&self) {}
/// }
///
/// let queue = SerialQueue::new();
/// let first = queue.enqueue(Arc::new(Noop));
/// let _second = queue.enqueue(Arc::new(Noop));
/// assert_eq!(queue.len(), 2);
///
/// queue.dequeue(first);
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Default)]
pub struct SerialQueue {
    state: Mutex<QueueState>,
}

impl SerialQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state is consistent after every statement, so a panic elsewhere
        // never leaves it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `operation` and starts it if the queue was empty.
    pub fn enqueue(&self, operation: Arc<dyn QueuedOperation>) -> Ticket {
        let (ticket, start_now) = {
            let mut state = self.lock();
            let ticket = Ticket(state.next_ticket);
            state.next_ticket += 1;

            state.entries.push_back(Entry {
                ticket,
                operation: Arc::clone(&operation),
            });
            tracing::debug!(
                "Queueing {} {} ({} in queue)",
                operation.describe(),
                ticket,
                state.entries.len()
            );

            let start_now = state.entries.len() == 1;
            if start_now {
                state.head_started_at = Some(Instant::now());
            }
            (ticket, start_now)
        };

        if start_now {
            tracing::debug!("Starting {} {}", operation.describe(), ticket);
            operation.start(ticket);
        }
        ticket
    }

    /// Removes the completed head operation and starts the next one.
    ///
    /// Called once by each operation's own completion path.
    pub fn dequeue(&self, ticket: Ticket) -> Dequeued {
        let (outcome, next) = {
            let mut state = self.lock();

            match state.entries.front() {
                Some(head) if head.ticket == ticket => {}
                _ => return Dequeued::Stale,
            }
            state.entries.pop_front();

            if let Some(started) = state.head_started_at.take() {
                tracing::debug!(
                    "Dequeueing {}: response took {:.3} secs ({} remaining)",
                    ticket,
                    started.elapsed().as_secs_f64(),
                    state.entries.len()
                );
            }

            let next = state
                .entries
                .front()
                .map(|entry| (entry.ticket, Arc::clone(&entry.operation)));
            if next.is_some() {
                state.head_started_at = Some(Instant::now());
                (Dequeued::Advanced, next)
            } else {
                (Dequeued::Drained, None)
            }
        };

        if let Some((next_ticket, operation)) = next {
            tracing::debug!("Starting {} {}", operation.describe(), next_ticket);
            operation.start(next_ticket);
        }
        outcome
    }

    /// Cancels the running operation only.
    ///
    /// Its completion path performs the dequeue; waiting operations are left
    /// untouched.
    pub fn cancel_pending(&self) {
        let head = {
            let state = self.lock();
            state
                .entries
                .front()
                .map(|entry| (entry.ticket, Arc::clone(&entry.operation)))
        };

        if let Some((ticket, operation)) = head {
            tracing::debug!("Cancelling running {} {}", operation.describe(), ticket);
            operation.cancel();
        }
    }

    /// Cancels every operation and empties the queue immediately.
    ///
    /// Completion paths that run afterwards find their ticket gone and leave
    /// the queue alone. Returns the number of operations removed.
    pub fn cancel_all(&self) -> usize {
        let removed: Vec<Entry> = {
            let mut state = self.lock();
            state.head_started_at = None;
            state.entries.drain(..).collect()
        };

        if !removed.is_empty() {
            tracing::debug!("Cancelling {} queued operations", removed.len());
        }
        let count = removed.len();
        for entry in removed {
            entry.operation.cancel();
        }
        count
    }

    /// Returns the number of outstanding operations, running one included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if no operation is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns the ticket of the running operation, if any.
    #[must_use]
    pub fn head(&self) -> Option<Ticket> {
        self.lock().entries.front().map(|entry| entry.ticket)
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("len", &self.len())
            .field("head", &self.head())
            .finish()
    }
}

// Verify SerialQueue is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SerialQueue>();
};
