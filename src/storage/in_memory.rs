//! InMemoryStorage - HashMap-backed redemption store for testing and embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::{RedemptionRepository, Storage, UnitOfWork};
use crate::error::StorageError;
use crate::redemption::{RedemptionQuery, RedemptionRecord};

type Rows = HashMap<Uuid, Vec<u8>>;

/// A write waiting for its unit of work to commit.
enum Staged {
    Upsert(Uuid, Vec<u8>),
    Remove(Uuid),
}

impl Staged {
    fn key(&self) -> Uuid {
        match self {
            Staged::Upsert(key, _) | Staged::Remove(key) => *key,
        }
    }
}

/// In-memory redemption store.
///
/// Rows are kept as JSON bytes keyed by record key, so every read hands out
/// a fresh copy. Clone-friendly via Arc; clones share the same rows.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    rows: Arc<RwLock<Rows>>,
    commits: Arc<AtomicU64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed rows.
    pub fn len(&self) -> Result<usize, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::Poisoned("len"))?;
        Ok(rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Number of units of work committed against this store.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Storage for InMemoryStorage {
    type Work = InMemoryUnitOfWork;

    fn unit_of_work(&self) -> Result<InMemoryUnitOfWork, StorageError> {
        Ok(InMemoryUnitOfWork {
            rows: Arc::clone(&self.rows),
            commits: Arc::clone(&self.commits),
            staged: Vec::new(),
        })
    }
}

pub struct InMemoryUnitOfWork {
    rows: Arc<RwLock<Rows>>,
    commits: Arc<AtomicU64>,
    staged: Vec<Staged>,
}

impl InMemoryUnitOfWork {
    /// Number of writes staged and not yet committed.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    type Repository<'a> = InMemoryRepository<'a>;

    fn redemptions(&mut self) -> InMemoryRepository<'_> {
        InMemoryRepository { work: self }
    }

    fn commit(mut self) -> Result<(), StorageError> {
        let staged = std::mem::take(&mut self.staged);
        {
            let mut rows = self
                .rows
                .write()
                .map_err(|_| StorageError::Poisoned("commit"))?;
            for write in staged {
                match write {
                    Staged::Upsert(key, bytes) => {
                        rows.insert(key, bytes);
                    }
                    Staged::Remove(key) => {
                        rows.remove(&key);
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            tracing::trace!(
                count = self.staged.len(),
                "discarding uncommitted redemption writes"
            );
        }
    }
}

/// Repository view over one [`InMemoryUnitOfWork`].
///
/// Reads see committed rows overlaid with the writes this unit of work has
/// staged so far.
pub struct InMemoryRepository<'a> {
    work: &'a mut InMemoryUnitOfWork,
}

fn encode(record: &RedemptionRecord) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(record).map_err(|e| StorageError::Serde(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<RedemptionRecord, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serde(e.to_string()))
}

impl RedemptionRepository for InMemoryRepository<'_> {
    fn add_or_update(&mut self, record: &RedemptionRecord) -> Result<(), StorageError> {
        let bytes = encode(record)?;
        self.work.staged.push(Staged::Upsert(record.key(), bytes));
        Ok(())
    }

    fn delete(&mut self, record: &RedemptionRecord) -> Result<(), StorageError> {
        self.work.staged.push(Staged::Remove(record.key()));
        Ok(())
    }

    fn get(&self, key: Uuid) -> Result<Option<RedemptionRecord>, StorageError> {
        if let Some(write) = self.work.staged.iter().rev().find(|w| w.key() == key) {
            return match write {
                Staged::Upsert(_, bytes) => decode(bytes).map(Some),
                Staged::Remove(_) => Ok(None),
            };
        }

        let rows = self
            .work
            .rows
            .read()
            .map_err(|_| StorageError::Poisoned("get"))?;
        let found = rows.get(&key).map(|bytes| decode(bytes)).transpose()?;
        Ok(found)
    }

    fn get_by_query(
        &self,
        query: &RedemptionQuery,
    ) -> Result<Vec<RedemptionRecord>, StorageError> {
        let mut visible: HashMap<Uuid, RedemptionRecord> = {
            let rows = self
                .work
                .rows
                .read()
                .map_err(|_| StorageError::Poisoned("query"))?;
            let decoded: Result<HashMap<Uuid, RedemptionRecord>, StorageError> = rows
                .iter()
                .map(|(key, bytes)| decode(bytes).map(|record| (*key, record)))
                .collect();
            decoded?
        };

        for write in &self.work.staged {
            match write {
                Staged::Upsert(key, bytes) => {
                    visible.insert(*key, decode(bytes)?);
                }
                Staged::Remove(key) => {
                    visible.remove(key);
                }
            }
        }

        let mut found: Vec<RedemptionRecord> = visible
            .into_values()
            .filter(|record| query.matches(record))
            .collect();
        found.sort_by(|a, b| {
            a.create_date()
                .cmp(&b.create_date())
                .then_with(|| a.key().cmp(&b.key()))
        });
        Ok(found)
    }
}
