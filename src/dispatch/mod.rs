//! Request admission and lifecycle cooperation.
//!
//! - [`SerialQueue`]: FIFO queue that runs one operation at a time
//! - [`BackgroundGuard`]: holds a background extension while work is outstanding
//! - [`Reachability`]: pre-flight connectivity probe

mod background;
mod queue;
mod reachability;

pub use background::{BackgroundGuard, BackgroundScheduler, ExtensionToken, NoopScheduler};
pub use queue::{Dequeued, QueuedOperation, SerialQueue, Ticket};
pub use reachability::{AssumeReachable, Reachability};
