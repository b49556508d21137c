use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a storage collaborator while opening, executing or
/// committing a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backing store could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A row could not be encoded or decoded.
    #[error("row serialization error: {0}")]
    Serde(String),
    /// An internal lock of the store was poisoned.
    #[error("storage lock poisoned during {0}")]
    Poisoned(&'static str),
    /// The store refused a single record.
    #[error("storage rejected record {key}: {reason}")]
    Rejected { key: Uuid, reason: String },
}

/// Errors raised by the ledger write lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The calling thread already holds the lock.
    #[error("write lock is not recursive")]
    Recursive,
}

/// Error returned by a notification listener. Aborts the remaining dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubscriberError {
    message: String,
}

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        SubscriberError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("monitor {0} is already registered")]
    DuplicateMonitor(Uuid),
}

/// Error type for every ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("subscriber failed during {event}: {source}")]
    Subscriber {
        event: &'static str,
        #[source]
        source: SubscriberError,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
