mod config;
mod error;
mod ledger;
mod lock;
mod monitor;
mod notify;
mod redemption;
mod storage;

pub use config::{BatchVeto, LedgerConfig, WriteOpts};
pub use error::{LedgerError, LockError, RegistryError, Result, StorageError, SubscriberError};
pub use ledger::RedemptionLedger;
pub use lock::{WriteGuard, WriteLock};
pub use monitor::{AuditEntry, AuditMonitor, AuditedRecord, Monitor, MonitorRegistry};
pub use notify::{Completed, NotificationBus, Operation, Payload, Pending, SubscriptionId};
pub use redemption::{InvoiceRef, OfferContext, RedemptionQuery, RedemptionRecord};
pub use storage::{
    InMemoryRepository, InMemoryStorage, InMemoryUnitOfWork, RedemptionRepository, Storage,
    UnitOfWork,
};
