//! Lifecycle notifications - typed, synchronous publish/subscribe.
//!
//! Every ledger write raises up to two notifications:
//!
//! ```text
//!   before(op)  ──▶  Pending    creating / saving / deleting   (may veto)
//!   commit
//!   after(op)   ──▶  Completed  created  / saved  / deleted    (informational)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let bus = NotificationBus::<RedemptionRecord>::new();
//! bus.before(Operation::Delete, |pending| {
//!     pending.cancel();
//!     Ok(())
//! });
//! ```

mod bus;
mod notification;

pub use bus::{NotificationBus, SubscriptionId};
pub use notification::{Completed, Payload, Pending};

/// The three lifecycle pairs a write can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Save,
    Delete,
}

impl Operation {
    /// Name of the pre-commit event.
    pub fn pending_event(self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Save => "saving",
            Operation::Delete => "deleting",
        }
    }

    /// Name of the post-commit event.
    pub fn completed_event(self) -> &'static str {
        match self {
            Operation::Create => "created",
            Operation::Save => "saved",
            Operation::Delete => "deleted",
        }
    }
}
