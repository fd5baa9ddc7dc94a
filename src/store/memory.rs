use std::collections::BTreeMap;

use crate::{error::StoreError, record::StudentRecord};

use super::{StoreResult, StudentStore};

type UndoEntry = (String, Option<StudentRecord>);

/// In-process store keyed by student id.
///
/// Writes inside a batch are journalled as (id, previous state) pairs so
/// both row and batch rollback can restore the exact prior contents. A row
/// scope opened outside a batch gets a journal of its own.
#[derive(Debug, Default)]
pub struct MemoryStudentStore {
    records: BTreeMap<String, StudentRecord>,
    journal: Option<Vec<UndoEntry>>,
    row_mark: Option<usize>,
    standalone_row: bool,
}

impl MemoryStudentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = StudentRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<&StudentRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &StudentRecord> {
        self.records.values()
    }

    fn remember(&mut self, id: &str) {
        let previous = self.records.get(id).cloned();
        if let Some(journal) = self.journal.as_mut() {
            journal.push((id.to_string(), previous));
        }
    }

    fn undo_to(&mut self, mark: usize) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        let undone = journal.split_off(mark);
        for (id, previous) in undone.into_iter().rev() {
            match previous {
                Some(record) => {
                    self.records.insert(id, record);
                }
                None => {
                    self.records.remove(&id);
                }
            }
        }
    }

    fn close_standalone_row(&mut self) {
        if self.standalone_row {
            self.journal = None;
            self.standalone_row = false;
        }
    }

    fn journal_len(&self) -> StoreResult<usize> {
        self.journal
            .as_ref()
            .map(Vec::len)
            .ok_or_else(|| StoreError::Rejected("no batch is open".into()))
    }
}

impl StudentStore for MemoryStudentStore {
    fn find(&self, id: &str) -> StoreResult<Option<StudentRecord>> {
        Ok(self.records.get(id).cloned())
    }

    fn insert(&mut self, record: &StudentRecord) -> StoreResult<()> {
        if self.records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.clone()));
        }
        self.remember(&record.id);
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn update(&mut self, record: &StudentRecord) -> StoreResult<()> {
        let Some(existing) = self.records.get(&record.id) else {
            return Err(StoreError::Missing(record.id.clone()));
        };
        let mut next = record.clone();
        next.is_validated = existing.is_validated;
        next.validation_date = existing.validation_date;
        self.remember(&record.id);
        self.records.insert(next.id.clone(), next);
        Ok(())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }

    fn begin_batch(&mut self) -> StoreResult<()> {
        if self.journal.is_some() {
            return Err(StoreError::Rejected("a batch is already open".into()));
        }
        self.journal = Some(Vec::new());
        self.row_mark = None;
        Ok(())
    }

    fn commit_batch(&mut self) -> StoreResult<()> {
        self.journal_len()?;
        self.journal = None;
        self.row_mark = None;
        Ok(())
    }

    fn rollback_batch(&mut self) -> StoreResult<()> {
        self.journal_len()?;
        self.undo_to(0);
        self.journal = None;
        self.row_mark = None;
        Ok(())
    }

    fn begin_row(&mut self) -> StoreResult<()> {
        if self.journal.is_none() {
            self.journal = Some(Vec::new());
            self.standalone_row = true;
        }
        self.row_mark = Some(self.journal_len()?);
        Ok(())
    }

    fn release_row(&mut self) -> StoreResult<()> {
        self.row_mark = None;
        self.close_standalone_row();
        Ok(())
    }

    fn rollback_row(&mut self) -> StoreResult<()> {
        let mark = self
            .row_mark
            .take()
            .ok_or_else(|| StoreError::Rejected("no row scope is open".into()))?;
        self.undo_to(mark);
        self.close_standalone_row();
        Ok(())
    }
}
