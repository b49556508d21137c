use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{Completed, Operation, Payload, Pending};
use crate::error::SubscriberError;

type BeforeListener<T> =
    Arc<dyn Fn(&mut Pending<'_, T>) -> Result<(), SubscriberError> + Send + Sync>;
type AfterListener<T> = Arc<dyn Fn(&Completed<'_, T>) -> Result<(), SubscriberError> + Send + Sync>;

/// Handle returned by a subscription; pass it to [`NotificationBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Registration<L> {
    id: SubscriptionId,
    operation: Operation,
    listener: L,
}

/// Synchronous notification bus over payload type `T`.
///
/// Listeners run on the publishing thread in registration order. The first
/// listener to return an error stops the dispatch and the error is handed
/// back to the publisher. Listener lists are copied before dispatch, so a
/// listener may subscribe or unsubscribe without deadlocking.
pub struct NotificationBus<T> {
    before: RwLock<Vec<Registration<BeforeListener<T>>>>,
    after: RwLock<Vec<Registration<AfterListener<T>>>>,
    next_id: AtomicU64,
}

impl<T> NotificationBus<T> {
    pub fn new() -> Self {
        NotificationBus {
            before: RwLock::new(Vec::new()),
            after: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Listen to the pre-commit event of `operation`.
    pub fn before<F>(&self, operation: Operation, listener: F) -> SubscriptionId
    where
        F: Fn(&mut Pending<'_, T>) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.before
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                operation,
                listener: Arc::new(listener),
            });
        id
    }

    /// Listen to the post-commit event of `operation`.
    pub fn after<F>(&self, operation: Operation, listener: F) -> SubscriptionId
    where
        F: Fn(&Completed<'_, T>) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.after
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                operation,
                listener: Arc::new(listener),
            });
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut before = self.before.write().unwrap_or_else(PoisonError::into_inner);
        let count = before.len();
        before.retain(|r| r.id != id);
        if before.len() != count {
            return true;
        }
        drop(before);

        let mut after = self.after.write().unwrap_or_else(PoisonError::into_inner);
        let count = after.len();
        after.retain(|r| r.id != id);
        after.len() != count
    }

    /// Number of listeners attached to either event of `operation`.
    pub fn listener_count(&self, operation: Operation) -> usize {
        let before = self.before.read().unwrap_or_else(PoisonError::into_inner);
        let after = self.after.read().unwrap_or_else(PoisonError::into_inner);
        before.iter().filter(|r| r.operation == operation).count()
            + after.iter().filter(|r| r.operation == operation).count()
    }

    /// Raise the pre-commit event. Returns `Ok(true)` when the operation was vetoed.
    ///
    /// Every listener sees the event even after one of them cancels.
    pub fn raise_before(
        &self,
        operation: Operation,
        payload: Payload<'_, T>,
        cancellable: bool,
    ) -> Result<bool, SubscriberError> {
        let listeners: Vec<BeforeListener<T>> = {
            let before = self.before.read().unwrap_or_else(PoisonError::into_inner);
            before
                .iter()
                .filter(|r| r.operation == operation)
                .map(|r| Arc::clone(&r.listener))
                .collect()
        };

        tracing::trace!(
            event = operation.pending_event(),
            listeners = listeners.len(),
            "raising notification"
        );

        let mut pending = Pending::new(operation, payload, cancellable);
        for listener in &listeners {
            listener(&mut pending)?;
        }
        Ok(pending.vetoed())
    }

    /// Raise the post-commit event.
    pub fn raise_after(
        &self,
        operation: Operation,
        payload: Payload<'_, T>,
    ) -> Result<(), SubscriberError> {
        let listeners: Vec<AfterListener<T>> = {
            let after = self.after.read().unwrap_or_else(PoisonError::into_inner);
            after
                .iter()
                .filter(|r| r.operation == operation)
                .map(|r| Arc::clone(&r.listener))
                .collect()
        };

        tracing::trace!(
            event = operation.completed_event(),
            listeners = listeners.len(),
            "raising notification"
        );

        let completed = Completed::new(operation, payload);
        for listener in &listeners {
            listener(&completed)?;
        }
        Ok(())
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl<T> Default for NotificationBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
