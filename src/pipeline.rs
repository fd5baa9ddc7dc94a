//! End-to-end ingestion: source bytes in, [`IngestionReport`] out.
//!
//! Fatal problems (unreadable source, no selectable sheet, no usable key
//! column) are returned as [`IngestError`] before any row reaches the
//! store. Everything after that is row-level and lands in the report.

use log::info;

use crate::{
    data::Cell,
    error::IngestError,
    io_utils,
    record::MergeMode,
    report::{DEFAULT_MAX_DIAGNOSTICS, IngestionReport, ReportBuilder},
    schema::{ColumnPlan, MappingTable},
    source::{self, SheetSelector, SourceFormat, TextOptions},
    store::StudentStore,
    upsert::{DEFAULT_BATCH_SIZE, NumberedRow, UpsertEngine},
};

/// Sheet rows are numbered from 1 and the header occupies row 1.
const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub max_diagnostics: usize,
    pub merge_mode: MergeMode,
    pub format: SourceFormat,
    pub text: TextOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            merge_mode: MergeMode::default(),
            format: SourceFormat::default(),
            text: TextOptions::default(),
        }
    }
}

fn is_blank_row(cells: &[Cell]) -> bool {
    cells.iter().all(Cell::is_missing)
}

/// Number of data rows up to and including the last non-blank one.
/// Blank rows before that point stay in and fail as keyless rows.
fn data_extent(rows: &[Vec<Cell>]) -> usize {
    rows.iter()
        .rposition(|cells| !is_blank_row(cells))
        .map_or(0, |last| last + 1)
}

pub fn ingest<S>(
    bytes: &[u8],
    selector: &SheetSelector,
    store: &mut S,
    mapping: &MappingTable,
    options: &IngestOptions,
) -> Result<IngestionReport, IngestError>
where
    S: StudentStore + ?Sized,
{
    let sheet = source::load_sheet(bytes, options.format, selector, mapping, &options.text)?;
    let plan = ColumnPlan::resolve(mapping, &sheet.headers, &sheet.rows)?;
    let coercer = mapping.coercer();

    let mut report = ReportBuilder::new(options.max_diagnostics)
        .with_sheet(&sheet.sheet_name)
        .with_plan(&plan)
        .with_source_digest(io_utils::sha256_hex(bytes));

    let extent = data_extent(&sheet.rows);
    report.record_trailing_blank_rows(sheet.rows.len() - extent);
    let rows: Vec<NumberedRow> = sheet.rows[..extent]
        .iter()
        .enumerate()
        .map(|(idx, cells)| (idx + FIRST_DATA_ROW, coercer.coerce_row(&plan, cells)))
        .collect();
    info!(
        "Ingesting {} row(s) from sheet '{}' keyed by '{}'",
        rows.len(),
        sheet.sheet_name,
        plan.id_column
    );

    let total = rows.len();
    UpsertEngine::new(store)
        .merge_mode(options.merge_mode)
        .batch_size(options.batch_size)
        .run(rows, total, &mut report);

    let report = report.finish();
    info!(
        "Ingestion finished: {} inserted, {} updated, {} error(s) out of {} row(s)",
        report.inserted, report.updated, report.errors, report.total_rows
    );
    Ok(report)
}
