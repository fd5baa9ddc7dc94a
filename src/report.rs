//! Aggregation of per-row outcomes into an [`IngestionReport`].

use std::fmt;

use log::warn;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::ColumnPlan;

pub const DEFAULT_MAX_DIAGNOSTICS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDiagnostic {
    /// 1-based sheet row, counting the header as row 1.
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
}

impl fmt::Display for RowDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "row {} ({id}): {}", self.row, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub total_rows: usize,
    pub successful_inserts: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
    pub success_rate: f64,
    pub sheet_used: String,
    pub id_column_used: String,
    pub mapped_columns: Vec<String>,
    pub unmapped_columns: Vec<String>,
    pub trailing_blank_rows: usize,
    pub diagnostics: Vec<RowDiagnostic>,
    pub suppressed_diagnostics: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
}

impl IngestionReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Label/value pairs for the terminal summary.
    pub fn summary_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Sheet", self.sheet_used.clone()),
            ("Id column", self.id_column_used.clone()),
            ("Rows processed", self.total_rows.to_string()),
            ("Inserted", self.inserted.to_string()),
            ("Updated", self.updated.to_string()),
            ("Errors", self.errors.to_string()),
            ("Success rate", format!("{:.1}%", self.success_rate * 100.0)),
            ("Trailing blank rows", self.trailing_blank_rows.to_string()),
            ("Mapped columns", self.mapped_columns.len().to_string()),
            ("Unmapped columns", self.unmapped_columns.len().to_string()),
        ]
    }
}

#[derive(Debug)]
pub struct ReportBuilder {
    max_diagnostics: usize,
    sheet_used: String,
    id_column_used: String,
    mapped_columns: Vec<String>,
    unmapped_columns: Vec<String>,
    source_sha256: Option<String>,
    total_rows: usize,
    inserted: usize,
    updated: usize,
    errors: usize,
    trailing_blank_rows: usize,
    diagnostics: Vec<RowDiagnostic>,
    suppressed_diagnostics: usize,
}

impl ReportBuilder {
    pub fn new(max_diagnostics: usize) -> Self {
        Self {
            max_diagnostics,
            sheet_used: String::new(),
            id_column_used: String::new(),
            mapped_columns: Vec::new(),
            unmapped_columns: Vec::new(),
            source_sha256: None,
            total_rows: 0,
            inserted: 0,
            updated: 0,
            errors: 0,
            trailing_blank_rows: 0,
            diagnostics: Vec::new(),
            suppressed_diagnostics: 0,
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet_used = sheet.into();
        self
    }

    pub fn with_plan(mut self, plan: &ColumnPlan) -> Self {
        self.id_column_used = plan.id_column.clone();
        self.mapped_columns = plan
            .bindings
            .iter()
            .map(|binding| binding.source.clone())
            .collect();
        self.unmapped_columns = plan.unmapped.clone();
        self
    }

    pub fn with_source_digest(mut self, digest: impl Into<String>) -> Self {
        self.source_sha256 = Some(digest.into());
        self
    }

    /// Empty rows after the last data row; they are not part of the run.
    pub fn record_trailing_blank_rows(&mut self, count: usize) {
        self.trailing_blank_rows += count;
    }

    pub fn record_insert(&mut self) {
        self.total_rows += 1;
        self.inserted += 1;
    }

    pub fn record_update(&mut self) {
        self.total_rows += 1;
        self.updated += 1;
    }

    pub fn record_error(&mut self, row: usize, id: Option<&str>, message: impl Into<String>) {
        self.total_rows += 1;
        self.errors += 1;
        self.push_diagnostic(RowDiagnostic {
            row,
            id: id.map(str::to_string),
            message: message.into(),
        });
    }

    /// A committed-looking batch was lost: move its successes to errors.
    pub fn reclassify_batch(
        &mut self,
        first_row: usize,
        inserted: usize,
        updated: usize,
        message: impl Into<String>,
    ) {
        self.inserted = self.inserted.saturating_sub(inserted);
        self.updated = self.updated.saturating_sub(updated);
        self.errors += inserted + updated;
        self.push_diagnostic(RowDiagnostic {
            row: first_row,
            id: None,
            message: message.into(),
        });
    }

    fn push_diagnostic(&mut self, diagnostic: RowDiagnostic) {
        warn!("{diagnostic}");
        if self.diagnostics.len() < self.max_diagnostics {
            self.diagnostics.push(diagnostic);
        } else {
            self.suppressed_diagnostics += 1;
        }
    }

    pub fn finish(self) -> IngestionReport {
        let successful_inserts = self.inserted + self.updated;
        let success_rate = if self.total_rows == 0 {
            0.0
        } else {
            successful_inserts as f64 / self.total_rows as f64
        };
        IngestionReport {
            run_id: Uuid::new_v4(),
            total_rows: self.total_rows,
            successful_inserts,
            inserted: self.inserted,
            updated: self.updated,
            errors: self.errors,
            success_rate,
            sheet_used: self.sheet_used,
            id_column_used: self.id_column_used,
            mapped_columns: self.mapped_columns,
            unmapped_columns: self.unmapped_columns,
            trailing_blank_rows: self.trailing_blank_rows,
            diagnostics: self.diagnostics,
            suppressed_diagnostics: self.suppressed_diagnostics,
            source_sha256: self.source_sha256,
        }
    }
}
