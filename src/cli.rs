use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{record::MergeMode, source::SourceFormat};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load student spreadsheet exports into the student_data store",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upsert every row of a spreadsheet export into the student store
    Ingest(IngestArgs),
    /// List the sheets of a workbook and the one ingestion would pick
    Sheets(SheetsArgs),
    /// Print one stored student record
    Show(ShowArgs),
    /// Print or export the effective column mapping
    Mapping(MappingArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Workbook (.xlsx/.xls/.ods) or delimited text file; '-' reads stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// SQLite database holding the student_data table (created if missing)
    #[arg(long, required_unless_present = "dry_run")]
    pub db: Option<PathBuf>,
    /// Sheet name to read (falls back to the mapping's fallback sheets)
    #[arg(long, conflicts_with = "sheet_index")]
    pub sheet: Option<String>,
    /// Zero-based sheet position to read
    #[arg(long = "sheet-index")]
    pub sheet_index: Option<usize>,
    /// YAML mapping file overriding the built-in column mapping
    #[arg(long)]
    pub mapping: Option<PathBuf>,
    /// Rows per committed transaction
    #[arg(long, default_value_t = crate::upsert::DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
    pub batch_size: usize,
    /// Maximum row problems listed in the report
    #[arg(long, default_value_t = crate::report::DEFAULT_MAX_DIAGNOSTICS)]
    pub max_diagnostics: usize,
    /// How rows update existing students
    #[arg(long, value_enum, default_value_t = MergeMode::Preserve)]
    pub merge_mode: MergeMode,
    /// Source format; 'auto' inspects the file's leading bytes
    #[arg(long, value_enum, default_value_t = SourceFormat::Auto)]
    pub format: SourceFormat,
    /// Delimiter for text sources (supports ',', 'tab', ';', '|'); sniffed when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of text sources (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write the full JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Run against an in-memory store; nothing is written to --db
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// Workbook or delimited text file; '-' reads stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML mapping file whose default sheet drives the recommendation
    #[arg(long)]
    pub mapping: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = SourceFormat::Auto)]
    pub format: SourceFormat,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// SQLite database holding the student_data table
    #[arg(long)]
    pub db: PathBuf,
    /// Student id to look up
    pub id: String,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MappingArgs {
    /// Mapping file to validate and print instead of the built-in one
    #[arg(long)]
    pub mapping: Option<PathBuf>,
    /// Write the mapping YAML here instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

fn parse_batch_size(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("Batch size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(err) => Err(format!("Invalid batch size '{value}': {err}")),
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
