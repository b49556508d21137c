//! Monitors - keyed observers of completed ledger operations.
//!
//! A [`MonitorRegistry`] is built once at startup from explicitly
//! constructed monitors, then attached to a [`NotificationBus`]. Each
//! monitor hears the post-commit event of the operation it triggers on.

mod audit;

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{RegistryError, SubscriberError};
use crate::notify::{Completed, NotificationBus, Operation, SubscriptionId};

pub use audit::{AuditEntry, AuditMonitor, AuditedRecord};

/// Observer of one completed ledger operation.
pub trait Monitor<T>: Send + Sync {
    /// Stable identity of this monitor within a registry.
    fn key(&self) -> Uuid;

    /// The operation whose post-commit event this monitor observes.
    fn trigger(&self) -> Operation;

    fn observe(&self, completed: &Completed<'_, T>) -> Result<(), SubscriberError>;
}

/// Registry of monitors keyed by [`Monitor::key`], in registration order.
pub struct MonitorRegistry<T> {
    monitors: Vec<Arc<dyn Monitor<T>>>,
}

impl<T: 'static> MonitorRegistry<T> {
    pub fn new() -> Self {
        MonitorRegistry {
            monitors: Vec::new(),
        }
    }

    pub fn register(&mut self, monitor: Arc<dyn Monitor<T>>) -> Result<(), RegistryError> {
        let key = monitor.key();
        if self.get(key).is_some() {
            return Err(RegistryError::DuplicateMonitor(key));
        }
        self.monitors.push(monitor);
        Ok(())
    }

    pub fn get(&self, key: Uuid) -> Option<Arc<dyn Monitor<T>>> {
        self.monitors.iter().find(|m| m.key() == key).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn Monitor<T>>] {
        &self.monitors
    }

    /// Monitors observing `operation`.
    pub fn for_trigger(&self, operation: Operation) -> Vec<Arc<dyn Monitor<T>>> {
        self.monitors
            .iter()
            .filter(|m| m.trigger() == operation)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Subscribe every monitor to its trigger's post-commit event.
    pub fn attach(&self, bus: &NotificationBus<T>) -> Vec<SubscriptionId> {
        self.monitors
            .iter()
            .map(|monitor| {
                let monitor = Arc::clone(monitor);
                let trigger = monitor.trigger();
                tracing::debug!(key = %monitor.key(), event = trigger.completed_event(), "attaching monitor");
                bus.after(trigger, move |completed| monitor.observe(completed))
            })
            .collect()
    }
}

impl<T: 'static> Default for MonitorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
