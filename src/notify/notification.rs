use super::Operation;

/// The records a notification is about.
#[derive(Debug)]
pub enum Payload<'a, T> {
    Single(&'a T),
    Batch(&'a [T]),
}

impl<T> Clone for Payload<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Payload<'_, T> {}

impl<'a, T> Payload<'a, T> {
    pub fn records(&self) -> &'a [T] {
        match *self {
            Payload::Single(record) => std::slice::from_ref(record),
            Payload::Batch(records) => records,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Payload::Batch(_))
    }
}

/// A pre-commit notification ("creating", "saving", "deleting").
///
/// Listeners may call [`Pending::cancel`]; the request only vetoes the
/// operation when the notification is cancellable.
pub struct Pending<'a, T> {
    operation: Operation,
    payload: Payload<'a, T>,
    cancellable: bool,
    cancelled: bool,
}

impl<'a, T> Pending<'a, T> {
    pub(crate) fn new(operation: Operation, payload: Payload<'a, T>, cancellable: bool) -> Self {
        Pending {
            operation,
            payload,
            cancellable,
            cancelled: false,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn event(&self) -> &'static str {
        self.operation.pending_event()
    }

    pub fn records(&self) -> &'a [T] {
        self.payload.records()
    }

    pub fn is_batch(&self) -> bool {
        self.payload.is_batch()
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Ask for the pending operation to be abandoned.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn vetoed(&self) -> bool {
        self.cancellable && self.cancelled
    }
}

/// A post-commit notification ("created", "saved", "deleted").
pub struct Completed<'a, T> {
    operation: Operation,
    payload: Payload<'a, T>,
}

impl<'a, T> Completed<'a, T> {
    pub(crate) fn new(operation: Operation, payload: Payload<'a, T>) -> Self {
        Completed { operation, payload }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn event(&self) -> &'static str {
        self.operation.completed_event()
    }

    pub fn records(&self) -> &'a [T] {
        self.payload.records()
    }

    pub fn is_batch(&self) -> bool {
        self.payload.is_batch()
    }
}
