//! Persistence seam for student records.
//!
//! The upsert engine only talks to [`StudentStore`]. Two implementations
//! ship with the crate: [`SqliteStudentStore`] for real databases and
//! [`MemoryStudentStore`] for dry runs and tests.
//!
//! Transactions come in two levels. A *batch* groups many rows and is made
//! durable by `commit_batch`; a *row* scope nests inside a batch so one bad
//! row can be undone without losing its neighbours. Stores without
//! transactional support may keep the default no-op scope methods.

mod memory;
mod sqlite;

pub use memory::MemoryStudentStore;
pub use sqlite::{SqliteStudentStore, TABLE_NAME};

use crate::{error::StoreError, record::StudentRecord};

pub type StoreResult<T> = Result<T, StoreError>;

pub trait StudentStore {
    fn find(&self, id: &str) -> StoreResult<Option<StudentRecord>>;

    /// Fails with [`StoreError::Duplicate`] when the key is already stored.
    fn insert(&mut self, record: &StudentRecord) -> StoreResult<()>;

    /// Replaces the attribute fields of an existing record. Validation state
    /// is left untouched.
    fn update(&mut self, record: &StudentRecord) -> StoreResult<()>;

    fn count(&self) -> StoreResult<usize>;

    fn begin_batch(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn commit_batch(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn rollback_batch(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn begin_row(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn release_row(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn rollback_row(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
