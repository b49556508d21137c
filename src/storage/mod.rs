//! Storage seam - units of work and the redemption repository they hand out.
//!
//! ```text
//! Storage ──unit_of_work()──▶ UnitOfWork ──redemptions()──▶ RedemptionRepository
//!                                 │                           add_or_update / delete
//!                                 │                           get / get_by_query
//!                                 └──commit()  (all staged writes, or none)
//! ```
//!
//! A repository borrows its unit of work mutably, so it is released before
//! the unit of work can be committed. Dropping a unit of work without
//! committing discards everything it staged.

mod in_memory;

use std::sync::Arc;

use uuid::Uuid;

use crate::error::StorageError;
use crate::redemption::{RedemptionQuery, RedemptionRecord};

pub use in_memory::{InMemoryRepository, InMemoryStorage, InMemoryUnitOfWork};

/// Storage access for redemption records, scoped to one unit of work.
pub trait RedemptionRepository {
    /// Insert the record, or overwrite the stored row with the same key.
    fn add_or_update(&mut self, record: &RedemptionRecord) -> Result<(), StorageError>;

    /// Remove the row with the record's key. Removing a missing row is a no-op.
    fn delete(&mut self, record: &RedemptionRecord) -> Result<(), StorageError>;

    fn get(&self, key: Uuid) -> Result<Option<RedemptionRecord>, StorageError>;

    fn get_by_query(&self, query: &RedemptionQuery)
        -> Result<Vec<RedemptionRecord>, StorageError>;
}

/// A transaction boundary grouping storage operations for atomic commit.
pub trait UnitOfWork {
    type Repository<'a>: RedemptionRepository
    where
        Self: 'a;

    /// Open the redemption repository for this unit of work.
    fn redemptions(&mut self) -> Self::Repository<'_>;

    /// Apply every staged write atomically.
    fn commit(self) -> Result<(), StorageError>;
}

/// Factory for units of work. Owns (or fronts) the connection pool.
pub trait Storage: Send + Sync {
    type Work: UnitOfWork;

    fn unit_of_work(&self) -> Result<Self::Work, StorageError>;
}

impl<S: Storage> Storage for Arc<S> {
    type Work = S::Work;

    fn unit_of_work(&self) -> Result<Self::Work, StorageError> {
        (**self).unit_of_work()
    }
}
