//! Row upsert engine: one coerced row at a time, grouped into batches.
//!
//! Each row runs inside its own store scope so a failing row is undone
//! without touching the rest of its batch. A batch that fails to commit is
//! rolled back as a whole and its successes are reported as errors.

use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    coerce::CoercedRow,
    error::StoreError,
    record::{MergeMode, StudentRecord},
    report::ReportBuilder,
    store::StudentStore,
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Updated,
}

/// A row to upsert together with its 1-based sheet row number.
pub type NumberedRow = (usize, CoercedRow);

pub struct UpsertEngine<'a, S: StudentStore + ?Sized> {
    store: &'a mut S,
    merge_mode: MergeMode,
    batch_size: usize,
}

impl<'a, S: StudentStore + ?Sized> UpsertEngine<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            merge_mode: MergeMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Upsert every row, recording outcomes in `report`. `total` is only
    /// used for progress logging.
    pub fn run<I>(&mut self, rows: I, total: usize, report: &mut ReportBuilder)
    where
        I: IntoIterator<Item = NumberedRow>,
    {
        let mut processed = 0usize;
        for batch in &rows.into_iter().chunks(self.batch_size) {
            let batch: Vec<NumberedRow> = batch.collect();
            processed += batch.len();
            self.run_batch(batch, report);
            info!("Processed {processed}/{total} row(s)");
        }
    }

    fn run_batch(&mut self, batch: Vec<NumberedRow>, report: &mut ReportBuilder) {
        let Some(first_row) = batch.first().map(|(row, _)| *row) else {
            return;
        };
        if let Err(err) = self.store.begin_batch() {
            for (row, coerced) in &batch {
                report.record_error(
                    *row,
                    coerced.id.as_deref(),
                    format!("batch could not be started: {err}"),
                );
            }
            return;
        }

        let mut inserted = 0usize;
        let mut updated = 0usize;
        for (row, coerced) in &batch {
            match self.upsert_row(coerced) {
                Ok(RowOutcome::Inserted) => {
                    inserted += 1;
                    report.record_insert();
                }
                Ok(RowOutcome::Updated) => {
                    updated += 1;
                    report.record_update();
                }
                Err(message) => report.record_error(*row, coerced.id.as_deref(), message),
            }
        }

        if let Err(err) = self.store.commit_batch() {
            if let Err(rollback_err) = self.store.rollback_batch() {
                warn!("Rolling back batch starting at row {first_row} failed: {rollback_err}");
            }
            report.reclassify_batch(
                first_row,
                inserted,
                updated,
                format!(
                    "batch of {} row(s) starting here was not committed: {err}",
                    batch.len()
                ),
            );
        }
    }

    /// Upsert one row inside its own store scope.
    pub fn upsert_row(&mut self, row: &CoercedRow) -> Result<RowOutcome, String> {
        let Some(id) = row.id.as_deref() else {
            return Err(format!("missing or invalid student id ({})", row.raw_id));
        };
        self.store
            .begin_row()
            .map_err(|err| format!("could not open row scope: {err}"))?;

        match self.apply(id, row) {
            Ok(outcome) => match self.store.release_row() {
                Ok(()) => {
                    debug!("Student '{id}' {outcome:?}");
                    Ok(outcome)
                }
                Err(err) => {
                    self.undo_row(id);
                    Err(format!("could not release row scope: {err}"))
                }
            },
            Err(err) => {
                self.undo_row(id);
                Err(err.to_string())
            }
        }
    }

    fn apply(&mut self, id: &str, row: &CoercedRow) -> Result<RowOutcome, StoreError> {
        match self.store.find(id)? {
            Some(mut existing) => {
                let changed = existing.merge(row, self.merge_mode);
                if changed.is_empty() {
                    debug!("Student '{id}' already up to date");
                } else {
                    debug!("Student '{id}' changed: {}", changed.join(", "));
                    self.store.update(&existing)?;
                }
                Ok(RowOutcome::Updated)
            }
            None => {
                let record = StudentRecord::from_row(row)
                    .ok_or_else(|| StoreError::Rejected("row has no usable id".into()))?;
                self.store.insert(&record)?;
                Ok(RowOutcome::Inserted)
            }
        }
    }

    fn undo_row(&mut self, id: &str) {
        if let Err(err) = self.store.rollback_row() {
            warn!("Rolling back student '{id}' failed: {err}");
        }
    }
}
