pub mod cli;
pub mod coerce;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod schema;
pub mod source;
pub mod store;
pub mod table;
pub mod upsert;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    pipeline::IngestOptions,
    schema::MappingTable,
    source::{SheetSelector, TextOptions},
    store::{MemoryStudentStore, SqliteStudentStore, StudentStore},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("student_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&args),
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Show(args) => handle_show(&args),
        Commands::Mapping(args) => handle_mapping(&args),
    }
}

fn load_mapping(path: Option<&Path>) -> Result<MappingTable> {
    match path {
        Some(path) => {
            MappingTable::load(path).with_context(|| format!("Loading mapping from {path:?}"))
        }
        None => MappingTable::builtin(),
    }
}

fn handle_ingest(args: &cli::IngestArgs) -> Result<()> {
    let mapping = load_mapping(args.mapping.as_deref())?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let options = IngestOptions {
        batch_size: args.batch_size,
        max_diagnostics: args.max_diagnostics,
        merge_mode: args.merge_mode,
        format: args.format,
        text: TextOptions {
            delimiter: args.delimiter,
            encoding,
        },
    };
    let selector = match (&args.sheet, args.sheet_index) {
        (Some(name), _) => SheetSelector::Name(name.clone()),
        (None, Some(index)) => SheetSelector::Index(index),
        (None, None) => SheetSelector::Default,
    };

    info!("Reading '{}'", args.input.display());
    let bytes = io_utils::read_input(&args.input)?;

    let report = match (&args.db, args.dry_run) {
        (Some(db), false) => {
            let mut store = SqliteStudentStore::open(db)
                .with_context(|| format!("Opening student database {db:?}"))?;
            let report = pipeline::ingest(&bytes, &selector, &mut store, &mapping, &options)?;
            info!("Student store now holds {} record(s)", store.count()?);
            store
                .close()
                .with_context(|| format!("Closing student database {db:?}"))?;
            report
        }
        (_, true) => {
            info!("Dry run: changes are kept in memory only");
            let mut store = MemoryStudentStore::new();
            pipeline::ingest(&bytes, &selector, &mut store, &mapping, &options)?
        }
        (None, false) => return Err(anyhow!("--db is required unless --dry-run is set")),
    };

    print!("{}", table::render_report(&report));
    if let Some(path) = &args.report {
        let json = report.to_json_pretty().context("Serializing ingestion report")?;
        fs::write(path, json).with_context(|| format!("Writing report to {path:?}"))?;
        info!("Report written to {path:?}");
    }
    Ok(())
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let mapping = load_mapping(args.mapping.as_deref())?;
    let bytes = io_utils::read_input(&args.input)?;
    let listing = source::list_sheets(&bytes, args.format, &mapping)?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&listing).context("Serializing sheet listing")?
        );
    } else {
        print!("{}", table::render_sheet_listing(&listing));
    }
    Ok(())
}

fn handle_show(args: &cli::ShowArgs) -> Result<()> {
    if !args.db.exists() {
        return Err(anyhow!("Database {:?} does not exist", args.db));
    }
    let store = SqliteStudentStore::open(&args.db)
        .with_context(|| format!("Opening student database {:?}", args.db))?;
    let record = store
        .find(&args.id)?
        .ok_or_else(|| anyhow!("No student with id '{}'", args.id))?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Serializing student record")?
        );
    } else {
        print!("{}", table::render_record(&record));
    }
    Ok(())
}

fn handle_mapping(args: &cli::MappingArgs) -> Result<()> {
    let mapping = load_mapping(args.mapping.as_deref())?;
    match &args.output {
        Some(path) => {
            mapping.save(path)?;
            info!(
                "Mapping with {} column(s) written to {path:?}",
                mapping.columns.len()
            );
        }
        None => print!("{}", mapping.to_yaml_string()?),
    }
    Ok(())
}
