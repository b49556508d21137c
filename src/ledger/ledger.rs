use std::sync::Arc;

use uuid::Uuid;

use crate::config::{BatchVeto, LedgerConfig, WriteOpts};
use crate::error::{LedgerError, Result, StorageError};
use crate::lock::WriteLock;
use crate::notify::{NotificationBus, Operation, Payload};
use crate::redemption::{InvoiceRef, OfferContext, RedemptionQuery, RedemptionRecord};
use crate::storage::{RedemptionRepository, Storage, UnitOfWork};

/// Records and queries offer redemptions.
///
/// Every write runs the same three phases:
///
/// 1. pre-commit notification, which a listener may veto (no lock held);
/// 2. write lock → unit of work → persist → commit → release;
/// 3. post-commit notification.
///
/// A veto is not an error: the record comes back with
/// [`RedemptionRecord::was_cancelled`] set and storage is never touched.
/// Reads open their own unit of work and never take the write lock.
pub struct RedemptionLedger<S> {
    storage: S,
    lock: Arc<WriteLock>,
    bus: Arc<NotificationBus<RedemptionRecord>>,
    config: LedgerConfig,
}

impl<S: Storage> RedemptionLedger<S> {
    /// Ledger with its own write lock and notification bus.
    pub fn new(storage: S) -> Self {
        RedemptionLedger {
            storage,
            lock: Arc::new(WriteLock::new()),
            bus: Arc::new(NotificationBus::new()),
            config: LedgerConfig::default(),
        }
    }

    /// Serialize writes with other ledgers holding the same lock.
    pub fn with_lock(mut self, lock: Arc<WriteLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_bus(mut self, bus: Arc<NotificationBus<RedemptionRecord>>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn bus(&self) -> &Arc<NotificationBus<RedemptionRecord>> {
        &self.bus
    }

    pub fn write_lock(&self) -> &Arc<WriteLock> {
        &self.lock
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Record that `offer` was applied to `invoice`.
    pub fn create(
        &self,
        offer: &OfferContext,
        invoice: impl Into<InvoiceRef>,
    ) -> Result<RedemptionRecord> {
        self.create_with(offer, invoice, self.config.write_opts())
    }

    pub fn create_with(
        &self,
        offer: &OfferContext,
        invoice: impl Into<InvoiceRef>,
        opts: WriteOpts,
    ) -> Result<RedemptionRecord> {
        let mut record = RedemptionRecord::new(offer, invoice.into());

        if opts.raise_events && self.veto(Operation::Create, Payload::Single(&record), true)? {
            record.set_cancelled(true);
            tracing::debug!(key = %record.key(), offer_code = record.offer_code(), "redemption create vetoed");
            return Ok(record);
        }

        self.commit(|repo| repo.add_or_update(&record))?;
        tracing::debug!(key = %record.key(), offer_code = record.offer_code(), "redemption created");

        if opts.raise_events {
            self.notify(Operation::Create, Payload::Single(&record))?;
        }
        Ok(record)
    }

    /// Persist the record's current state, inserting it if absent.
    ///
    /// The record's update date only moves once the write has committed.
    pub fn save(&self, record: &mut RedemptionRecord) -> Result<()> {
        self.save_with(record, self.config.write_opts())
    }

    pub fn save_with(&self, record: &mut RedemptionRecord, opts: WriteOpts) -> Result<()> {
        record.set_cancelled(false);

        if opts.raise_events && self.veto(Operation::Save, Payload::Single(&*record), true)? {
            record.set_cancelled(true);
            tracing::debug!(key = %record.key(), "redemption save vetoed");
            return Ok(());
        }

        let mut stamped = record.clone();
        stamped.touch();
        self.commit(|repo| repo.add_or_update(&stamped))?;
        *record = stamped;
        tracing::debug!(key = %record.key(), "redemption saved");

        if opts.raise_events {
            self.notify(Operation::Save, Payload::Single(&*record))?;
        }
        Ok(())
    }

    /// Persist every record in one unit of work: all of them commit or none do.
    ///
    /// The batch "saving" notification only vetoes when the ledger is
    /// configured with [`BatchVeto::Honor`].
    pub fn save_all(&self, records: &mut [RedemptionRecord]) -> Result<()> {
        self.save_all_with(records, self.config.write_opts())
    }

    pub fn save_all_with(&self, records: &mut [RedemptionRecord], opts: WriteOpts) -> Result<()> {
        if self.batch_vetoed(Operation::Save, records, opts)? {
            return Ok(());
        }

        let mut stamped = records.to_vec();
        stamped.iter_mut().for_each(RedemptionRecord::touch);
        self.commit(|repo| stamped.iter().try_for_each(|r| repo.add_or_update(r)))?;
        records.clone_from_slice(&stamped);
        tracing::debug!(count = records.len(), "redemption batch saved");

        if opts.raise_events {
            self.notify(Operation::Save, Payload::Batch(&*records))?;
        }
        Ok(())
    }

    pub fn delete(&self, record: &mut RedemptionRecord) -> Result<()> {
        self.delete_with(record, self.config.write_opts())
    }

    pub fn delete_with(&self, record: &mut RedemptionRecord, opts: WriteOpts) -> Result<()> {
        record.set_cancelled(false);

        if opts.raise_events && self.veto(Operation::Delete, Payload::Single(&*record), true)? {
            record.set_cancelled(true);
            tracing::debug!(key = %record.key(), "redemption delete vetoed");
            return Ok(());
        }

        self.commit(|repo| repo.delete(record))?;
        tracing::debug!(key = %record.key(), "redemption deleted");

        if opts.raise_events {
            self.notify(Operation::Delete, Payload::Single(&*record))?;
        }
        Ok(())
    }

    /// Delete every record in one unit of work: all of them go or none do.
    pub fn delete_all(&self, records: &mut [RedemptionRecord]) -> Result<()> {
        self.delete_all_with(records, self.config.write_opts())
    }

    pub fn delete_all_with(
        &self,
        records: &mut [RedemptionRecord],
        opts: WriteOpts,
    ) -> Result<()> {
        if self.batch_vetoed(Operation::Delete, records, opts)? {
            return Ok(());
        }

        self.commit(|repo| records.iter().try_for_each(|r| repo.delete(r)))?;
        tracing::debug!(count = records.len(), "redemption batch deleted");

        if opts.raise_events {
            self.notify(Operation::Delete, Payload::Batch(&*records))?;
        }
        Ok(())
    }

    /// Look a redemption up by key. `Ok(None)` when no such record exists.
    pub fn get_by_key(&self, key: Uuid) -> Result<Option<RedemptionRecord>> {
        tracing::trace!(%key, "loading redemption");
        self.read(|repo| repo.get(key))
    }

    pub fn get_by_invoice_key(&self, invoice_key: Uuid) -> Result<Vec<RedemptionRecord>> {
        self.get_by_query(&RedemptionQuery::new().invoice(invoice_key))
    }

    pub fn get_by_customer_key(&self, customer_key: Uuid) -> Result<Vec<RedemptionRecord>> {
        self.get_by_query(&RedemptionQuery::new().customer(customer_key))
    }

    pub fn get_by_offer_settings_key(
        &self,
        offer_settings_key: Uuid,
    ) -> Result<Vec<RedemptionRecord>> {
        self.get_by_query(&RedemptionQuery::new().offer_settings(offer_settings_key))
    }

    pub fn get_by_offer_settings_key_and_customer_key(
        &self,
        offer_settings_key: Uuid,
        customer_key: Uuid,
    ) -> Result<Vec<RedemptionRecord>> {
        self.get_by_query(
            &RedemptionQuery::new()
                .offer_settings(offer_settings_key)
                .customer(customer_key),
        )
    }

    pub fn get_by_offer_provider_key(
        &self,
        offer_provider_key: Uuid,
    ) -> Result<Vec<RedemptionRecord>> {
        self.get_by_query(&RedemptionQuery::new().offer_provider(offer_provider_key))
    }

    /// All redemptions matching `query`; empty when nothing matches.
    pub fn get_by_query(&self, query: &RedemptionQuery) -> Result<Vec<RedemptionRecord>> {
        tracing::trace!(?query, "querying redemptions");
        self.read(|repo| repo.get_by_query(query))
    }

    fn batch_vetoed(
        &self,
        operation: Operation,
        records: &mut [RedemptionRecord],
        opts: WriteOpts,
    ) -> Result<bool> {
        for record in records.iter_mut() {
            record.set_cancelled(false);
        }
        if !opts.raise_events {
            return Ok(false);
        }

        let cancellable = self.config.batch_veto == BatchVeto::Honor;
        if !self.veto(operation, Payload::Batch(&*records), cancellable)? {
            return Ok(false);
        }

        for record in records.iter_mut() {
            record.set_cancelled(true);
        }
        tracing::debug!(
            event = operation.pending_event(),
            count = records.len(),
            "redemption batch vetoed"
        );
        Ok(true)
    }

    fn veto(
        &self,
        operation: Operation,
        payload: Payload<'_, RedemptionRecord>,
        cancellable: bool,
    ) -> Result<bool> {
        self.bus
            .raise_before(operation, payload, cancellable)
            .map_err(|source| LedgerError::Subscriber {
                event: operation.pending_event(),
                source,
            })
    }

    fn notify(&self, operation: Operation, payload: Payload<'_, RedemptionRecord>) -> Result<()> {
        self.bus
            .raise_after(operation, payload)
            .map_err(|source| LedgerError::Subscriber {
                event: operation.completed_event(),
                source,
            })
    }

    /// Run `persist` inside one unit of work while holding the write lock.
    ///
    /// The repository is released before the commit; the lock guard is
    /// released on every exit path.
    fn commit<F>(&self, persist: F) -> Result<()>
    where
        F: FnOnce(&mut dyn RedemptionRepository) -> std::result::Result<(), StorageError>,
    {
        let _guard = self.lock.write()?;
        let mut work = self.storage.unit_of_work()?;
        persist(&mut work.redemptions())?;
        work.commit()?;
        Ok(())
    }

    fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&dyn RedemptionRepository) -> std::result::Result<T, StorageError>,
    {
        let mut work = self.storage.unit_of_work()?;
        let found = query(&work.redemptions())?;
        Ok(found)
    }
}
