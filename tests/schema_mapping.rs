mod common;

use common::{TestWorkspace, delimited};
use student_ingest::{
    pipeline::{IngestOptions, ingest},
    schema::{MappingTable, STUDENT_FIELDS},
    source::SheetSelector,
    store::MemoryStudentStore,
};

#[test]
fn builtin_mapping_round_trips_through_yaml_file() {
    let workspace = TestWorkspace::new();
    let path = workspace.join("mapping.yaml");
    let table = MappingTable::builtin().unwrap();
    table.save(&path).unwrap();

    let reloaded = MappingTable::load(&path).unwrap();
    assert_eq!(reloaded.columns, table.columns);
    assert_eq!(reloaded.id_candidates, table.id_candidates);
    assert_eq!(reloaded.sheet_fallbacks, table.sheet_fallbacks);
}

#[test]
fn every_catalog_field_is_reachable_from_the_builtin_mapping() {
    let table = MappingTable::builtin().unwrap();
    assert_eq!(STUDENT_FIELDS.len(), 68);
    for spec in STUDENT_FIELDS {
        assert!(
            table.columns.iter().any(|column| column.field == spec.name),
            "{} unmapped",
            spec.name
        );
    }
}

#[test]
fn custom_mapping_changes_keys_sentinels_and_headers() {
    let raw = r#"
default_sheet: Matricula
id_candidates: [Documento]
sentinels: ["sin dato"]
columns:
  - { source: Carrera, field: programa }
  - { source: Estrato socioeconomico, field: estrato }
"#;
    let table = MappingTable::from_yaml_str(raw).unwrap();
    assert_eq!(table.id_sample_size, 3);

    let text = delimited(
        &["Documento", "Carrera", "Estrato socioeconomico"],
        &[&["1001", "SIN DATO", "2"], &["nan", "Derecho", "1"]],
        ',',
    );
    let mut store = MemoryStudentStore::new();
    let report = ingest(
        text.as_bytes(),
        &SheetSelector::Default,
        &mut store,
        &table,
        &IngestOptions::default(),
    )
    .unwrap();

    assert_eq!(report.id_column_used, "Documento");
    assert_eq!(report.successful_inserts, 2);
    let first = store.get("1001").unwrap();
    assert!(first.get("programa").is_none());
    assert!(store.get("nan").is_some());
}

#[test]
fn loading_invalid_mapping_file_reports_the_path() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "broken.yaml",
        "id_candidates: []\ncolumns: []\n",
    );
    let err = MappingTable::load(&path).unwrap_err();
    let rendered = format!("{err:#}");
    assert!(rendered.contains("broken.yaml"));
    assert!(rendered.contains("id candidate"));
}
