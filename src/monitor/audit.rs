use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Monitor;
use crate::error::SubscriberError;
use crate::notify::{Completed, Operation};
use crate::redemption::RedemptionRecord;

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: String,
    pub batch: bool,
    pub records: Vec<AuditedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedRecord {
    pub key: Uuid,
    pub offer_code: String,
    pub invoice_key: Uuid,
    pub customer_key: Option<Uuid>,
}

impl From<&RedemptionRecord> for AuditedRecord {
    fn from(record: &RedemptionRecord) -> Self {
        AuditedRecord {
            key: record.key(),
            offer_code: record.offer_code().to_string(),
            invoice_key: record.invoice_key(),
            customer_key: record.customer_key(),
        }
    }
}

/// Writes a JSON line per completed operation to an in-memory trail and to
/// the `offer_ledger::audit` tracing target.
///
/// Several monitors can share one trail to audit more than one operation.
pub struct AuditMonitor {
    key: Uuid,
    trigger: Operation,
    trail: Arc<Mutex<Vec<String>>>,
}

impl AuditMonitor {
    pub fn new(key: Uuid, trigger: Operation) -> Self {
        Self::with_trail(key, trigger, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_trail(key: Uuid, trigger: Operation, trail: Arc<Mutex<Vec<String>>>) -> Self {
        AuditMonitor { key, trigger, trail }
    }

    /// Snapshot of the trail.
    pub fn lines(&self) -> Vec<String> {
        match self.trail.lock() {
            Ok(trail) => trail.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Monitor<RedemptionRecord> for AuditMonitor {
    fn key(&self) -> Uuid {
        self.key
    }

    fn trigger(&self) -> Operation {
        self.trigger
    }

    fn observe(&self, completed: &Completed<'_, RedemptionRecord>) -> Result<(), SubscriberError> {
        let entry = AuditEntry {
            event: completed.event().to_string(),
            batch: completed.is_batch(),
            records: completed.records().iter().map(AuditedRecord::from).collect(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| SubscriberError::new(format!("audit entry encoding failed: {}", e)))?;

        tracing::info!(target: "offer_ledger::audit", "{}", line);

        self.trail
            .lock()
            .map_err(|_| SubscriberError::new("audit trail poisoned"))?
            .push(line);
        Ok(())
    }
}
