#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use tempfile::{TempDir, tempdir};

/// One cell of a generated workbook.
#[derive(Debug, Clone, Copy)]
pub enum Fixture<'a> {
    Text(&'a str),
    Number(f64),
    Bool(bool),
    Date(u16, u8, u8),
    Empty,
}

pub use Fixture::{Bool, Date, Empty, Number, Text};

/// Builds an in-memory `.xlsx` with one worksheet per `(name, rows)` entry.
/// The first row of each sheet is written as-is, so it doubles as the header.
pub fn xlsx_bytes(sheets: &[(&str, Vec<Vec<Fixture<'_>>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("sheet name");
        for (row_idx, row) in rows.iter().enumerate() {
            let row_num = row_idx as u32;
            for (col_idx, cell) in row.iter().enumerate() {
                let col = col_idx as u16;
                match *cell {
                    Text(value) => {
                        sheet.write_string(row_num, col, value).expect("write string");
                    }
                    Number(value) => {
                        sheet.write_number(row_num, col, value).expect("write number");
                    }
                    Bool(value) => {
                        sheet.write_boolean(row_num, col, value).expect("write boolean");
                    }
                    Date(year, month, day) => {
                        let date = ExcelDateTime::from_ymd(year, month, day).expect("valid date");
                        sheet
                            .write_datetime_with_format(row_num, col, &date, &date_format)
                            .expect("write date");
                    }
                    Empty => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("serialize workbook")
}

/// Header row followed by data rows, all as text cells.
pub fn text_rows<'a>(header: &[&'a str], rows: &[&[&'a str]]) -> Vec<Vec<Fixture<'a>>> {
    std::iter::once(header)
        .chain(rows.iter().copied())
        .map(|row| {
            row.iter()
                .map(|value| if value.is_empty() { Empty } else { Text(*value) })
                .collect()
        })
        .collect()
}

/// Joins rows with `delimiter`; no quoting, so keep fixture values simple.
pub fn delimited(header: &[&str], rows: &[&[&str]], delimiter: char) -> String {
    let separator = delimiter.to_string();
    std::iter::once(header)
        .chain(rows.iter().copied())
        .map(|row| row.join(separator.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}
