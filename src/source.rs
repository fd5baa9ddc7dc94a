//! Turns a raw upload into one in-memory sheet of [`Cell`]s.
//!
//! Workbooks (xlsx, xls, ods) go through `calamine`; everything else is read
//! as delimited text. Either way the result is a [`SheetTable`]: trimmed
//! headers plus rows of cells, fully loaded before any coercion starts.

use std::{fmt, io::Cursor};

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto_from_rs};
use clap::ValueEnum;
use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::{Cell, parse_calendar},
    error::IngestError,
    io_utils,
    schema::MappingTable,
};

/// Sheet name reported for delimited sources, which have exactly one.
pub const DELIMITED_SHEET_NAME: &str = "csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[value(rename_all = "kebab-case")]
pub enum SourceFormat {
    #[default]
    Auto,
    Workbook,
    Delimited,
}

impl SourceFormat {
    fn resolve(self, bytes: &[u8]) -> SourceFormat {
        match self {
            SourceFormat::Auto if io_utils::looks_like_workbook(bytes) => SourceFormat::Workbook,
            SourceFormat::Auto => SourceFormat::Delimited,
            explicit => explicit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelector {
    /// Use the mapping table's default sheet.
    #[default]
    Default,
    Name(String),
    Index(usize),
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Default => write!(f, "<default>"),
            SheetSelector::Name(name) => write!(f, "'{name}'"),
            SheetSelector::Index(index) => write!(f, "#{index}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetTable {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SheetListing {
    pub sheets: Vec<String>,
    pub total_sheets: usize,
    pub recommended_sheet: Option<String>,
}

type Workbook<'a> = Sheets<Cursor<&'a [u8]>>;

fn open_workbook(bytes: &[u8]) -> Result<Workbook<'_>, IngestError> {
    open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| IngestError::UnreadableSource(format!("cannot open workbook: {err}")))
}

/// Load the selected sheet, walking the fallback candidates when needed.
pub fn load_sheet(
    bytes: &[u8],
    format: SourceFormat,
    selector: &SheetSelector,
    mapping: &MappingTable,
    text: &TextOptions,
) -> Result<SheetTable, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::UnreadableSource("source is empty".into()));
    }
    match format.resolve(bytes) {
        SourceFormat::Delimited => {
            if !matches!(selector, SheetSelector::Default) {
                debug!("Ignoring sheet selector {selector} for a delimited source");
            }
            read_delimited(bytes, text)
        }
        _ => read_workbook_sheet(bytes, selector, mapping),
    }
}

fn read_workbook_sheet(
    bytes: &[u8],
    selector: &SheetSelector,
    mapping: &MappingTable,
) -> Result<SheetTable, IngestError> {
    let mut workbook = open_workbook(bytes)?;
    let available = workbook.sheet_names();
    if available.is_empty() {
        return Err(IngestError::UnreadableSource("workbook has no sheets".into()));
    }

    let requested = match selector {
        SheetSelector::Default => mapping.default_sheet.clone(),
        SheetSelector::Name(name) => name.clone(),
        SheetSelector::Index(index) => match available.get(*index) {
            Some(name) => name.clone(),
            None => format!("#{index}"),
        },
    };
    let candidates = mapping.sheet_candidates(Some(requested.as_str()));

    for candidate in &candidates {
        if !available.contains(candidate) {
            debug!("Sheet '{candidate}' not present");
            continue;
        }
        match workbook.worksheet_range(candidate) {
            Ok(range) => {
                let table = table_from_range(candidate, &range);
                info!(
                    "Read sheet '{candidate}' ({} row(s), {} column(s))",
                    table.row_count(),
                    table.headers.len()
                );
                return Ok(table);
            }
            Err(err) => warn!("Sheet '{candidate}' could not be read: {err}"),
        }
    }

    Err(IngestError::SheetNotFound {
        requested,
        tried: candidates,
        available,
    })
}

fn table_from_range(sheet_name: &str, range: &Range<Data>) -> SheetTable {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|header_row| header_row.iter().map(header_text).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();
    SheetTable {
        sheet_name: sheet_name.to_string(),
        headers,
        rows,
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

pub fn cell_from_data(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Missing,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Boolean(*b),
        Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            Some(ts) => Cell::Temporal(ts),
            None => Cell::Missing,
        },
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) => parse_calendar(s)
            .map(Cell::Temporal)
            .unwrap_or_else(|| Cell::from_text(s)),
        Data::DurationIso(s) => Cell::from_text(s),
    }
}

fn read_delimited(bytes: &[u8], options: &TextOptions) -> Result<SheetTable, IngestError> {
    let text = io_utils::decode_bytes(bytes, options.encoding)
        .map_err(|err| IngestError::UnreadableSource(err.to_string()))?;
    if text.contains('\0') {
        return Err(IngestError::UnreadableSource(
            "binary content in a delimited source".into(),
        ));
    }
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| io_utils::sniff_delimiter(&text));
    debug!(
        "Reading delimited source with '{}'",
        io_utils::printable_delimiter(delimiter)
    );

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(Ok(record)) => record.iter().map(|h| h.trim().to_string()).collect(),
        Some(Err(err)) => {
            return Err(IngestError::UnreadableSource(format!(
                "malformed header line: {err}"
            )));
        }
        None => return Err(IngestError::UnreadableSource("no header line".into())),
    };
    if headers.iter().all(String::is_empty) {
        return Err(IngestError::UnreadableSource("header line is blank".into()));
    }

    let mut rows = Vec::new();
    for (idx, record) in records.enumerate() {
        let record = record.map_err(|err| {
            IngestError::UnreadableSource(format!("malformed line {}: {err}", idx + 2))
        })?;
        let mut row: Vec<Cell> = record.iter().map(Cell::from_text).collect();
        row.resize(headers.len().max(row.len()), Cell::Missing);
        rows.push(row);
    }
    info!(
        "Read delimited source ({} row(s), {} column(s))",
        rows.len(),
        headers.len()
    );
    Ok(SheetTable {
        sheet_name: DELIMITED_SHEET_NAME.to_string(),
        headers,
        rows,
    })
}

/// Sheet names of a source and the one an operator should pick.
pub fn list_sheets(
    bytes: &[u8],
    format: SourceFormat,
    mapping: &MappingTable,
) -> Result<SheetListing, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::UnreadableSource("source is empty".into()));
    }
    let sheets = match format.resolve(bytes) {
        SourceFormat::Delimited => vec![DELIMITED_SHEET_NAME.to_string()],
        _ => open_workbook(bytes)?.sheet_names(),
    };
    let recommended_sheet = if sheets.contains(&mapping.default_sheet) {
        Some(mapping.default_sheet.clone())
    } else {
        sheets.first().cloned()
    };
    Ok(SheetListing {
        total_sheets: sheets.len(),
        sheets,
        recommended_sheet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_rows_are_padded_to_header_width() {
        let mapping = MappingTable::builtin().unwrap();
        let table = load_sheet(
            b"Id;Programa;Estrato\nT1;Derecho\n",
            SourceFormat::Auto,
            &SheetSelector::Default,
            &mapping,
            &TextOptions::default(),
        )
        .unwrap();
        assert_eq!(table.sheet_name, DELIMITED_SHEET_NAME);
        assert_eq!(table.headers, vec!["Id", "Programa", "Estrato"]);
        assert_eq!(
            table.rows[0],
            vec![
                Cell::Text("T1".into()),
                Cell::Text("Derecho".into()),
                Cell::Missing
            ]
        );
    }

    #[test]
    fn empty_source_is_unreadable() {
        let mapping = MappingTable::builtin().unwrap();
        let err = load_sheet(
            b"",
            SourceFormat::Auto,
            &SheetSelector::Default,
            &mapping,
            &TextOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unreadable_source");
    }

    #[test]
    fn forced_workbook_format_rejects_text() {
        let mapping = MappingTable::builtin().unwrap();
        let err = load_sheet(
            b"Id,Programa\nT1,X\n",
            SourceFormat::Workbook,
            &SheetSelector::Default,
            &mapping,
            &TextOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::UnreadableSource(_)));
    }

    #[test]
    fn calamine_cells_map_to_closed_variant() {
        assert_eq!(cell_from_data(&Data::Empty), Cell::Missing);
        assert_eq!(cell_from_data(&Data::Int(4)), Cell::Number(4.0));
        assert_eq!(cell_from_data(&Data::String(String::new())), Cell::Missing);
        assert!(matches!(
            cell_from_data(&Data::DateTimeIso("2003-05-14T00:00:00".into())),
            Cell::Temporal(_)
        ));
    }

    #[test]
    fn listing_delimited_source_reports_single_sheet() {
        let mapping = MappingTable::builtin().unwrap();
        let listing = list_sheets(b"Id\nT1\n", SourceFormat::Auto, &mapping).unwrap();
        assert_eq!(listing.sheets, vec![DELIMITED_SHEET_NAME]);
        assert_eq!(listing.recommended_sheet.as_deref(), Some(DELIMITED_SHEET_NAME));
    }
}
