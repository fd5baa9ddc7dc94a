use student_ingest::{
    data::Value,
    record::StudentRecord,
    report::ReportBuilder,
    source::SheetListing,
    table::{render_record, render_report, render_sheet_listing, render_table},
};

#[test]
fn render_table_aligns_columns() {
    let headers = vec!["id".to_string(), "programa".to_string()];
    let rows = vec![
        vec!["T1".to_string(), "Derecho".to_string()],
        vec!["T10".to_string(), "Medicina".to_string()],
    ];

    let rendered = render_table(&headers, &rows);
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(
        lines,
        vec![
            "id   programa",
            "---  --------",
            "T1   Derecho",
            "T10  Medicina"
        ]
    );
}

#[test]
fn render_table_flattens_control_characters() {
    let headers = vec!["direccion".to_string()];
    let rows = vec![vec!["Calle 5\nApto\t2".to_string()]];

    let rendered = render_table(&headers, &rows);
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], "Calle 5 Apto 2");
}

#[test]
fn render_record_lists_fields_in_table_order() {
    let mut record = StudentRecord::new("T000YAHAA");
    record.set("estrato", Some(Value::Integer(3)));
    record.set("programa", Some(Value::String("Ingenieria".into())));

    let rendered = render_record(&record);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[2], "id         T000YAHAA");
    assert_eq!(lines[3], "validated  no");
    let programa = lines.iter().position(|line| line.starts_with("programa"));
    let estrato = lines.iter().position(|line| line.starts_with("estrato"));
    assert!(programa < estrato);
}

#[test]
fn render_report_includes_diagnostics_and_overflow_note() {
    let mut builder = ReportBuilder::new(1).with_sheet("202430");
    builder.record_insert();
    builder.record_error(3, None, "missing or invalid student id");
    builder.record_error(4, Some("T9"), "store rejected row");
    let rendered = render_report(&builder.finish());

    assert!(rendered.contains("Sheet"));
    assert!(rendered.contains("202430"));
    assert!(rendered.contains("33.3%"));
    assert!(rendered.contains("missing or invalid student id"));
    assert!(!rendered.contains("store rejected row"));
    assert!(rendered.contains("1 more problem(s)"));
}

#[test]
fn render_sheet_listing_marks_recommendation() {
    let listing = SheetListing {
        sheets: vec!["Resumen".into(), "202430".into()],
        total_sheets: 2,
        recommended_sheet: Some("202430".into()),
    };
    let rendered = render_sheet_listing(&listing);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[2], "0      Resumen");
    assert_eq!(lines[3], "1      202430   *");
}
