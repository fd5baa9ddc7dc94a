//! Plain-text tables for terminal output.

use std::{borrow::Cow, fmt::Write as _};

use crate::{record::StudentRecord, report::IngestionReport, source::SheetListing};

const COLUMN_GAP: &str = "  ";
const MIN_RULE_WIDTH: usize = 3;

/// Left-aligned columns, a dashed rule under the header, trailing spaces
/// trimmed. Cells beyond the header count are dropped.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows);
    let rule = widths
        .iter()
        .map(|width| "-".repeat((*width).max(MIN_RULE_WIDTH)))
        .collect::<Vec<_>>();
    let rule_widths = widths
        .iter()
        .map(|width| (*width).max(MIN_RULE_WIDTH))
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let _ = writeln!(output, "{}", format_line(&rule, &rule_widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

fn column_widths(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| visible_width(h)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }
    widths.iter().map(|width| (*width).max(1)).collect()
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let flat = flatten_whitespace(value);
            let padding = width.saturating_sub(visible_width(&flat));
            format!("{flat}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    line.truncate(line.trim_end().len());
    line
}

/// Character count ignoring ANSI colour sequences.
fn visible_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut in_escape = false;
    for ch in value.chars() {
        match (in_escape, ch) {
            (false, '\u{1b}') => in_escape = true,
            (true, 'm') => in_escape = false,
            (true, _) => {}
            (false, _) => width += 1,
        }
    }
    width
}

fn flatten_whitespace(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn two_columns<'a, I>(left: &str, right: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let headers = vec![left.to_string(), right.to_string()];
    let rows = pairs
        .into_iter()
        .map(|(label, value)| vec![label.to_string(), value])
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_report(report: &IngestionReport) -> String {
    let mut output = two_columns("metric", "value", report.summary_pairs());
    if !report.diagnostics.is_empty() {
        let headers = vec!["row".to_string(), "id".to_string(), "problem".to_string()];
        let rows = report
            .diagnostics
            .iter()
            .map(|diagnostic| {
                vec![
                    diagnostic.row.to_string(),
                    diagnostic.id.clone().unwrap_or_default(),
                    diagnostic.message.clone(),
                ]
            })
            .collect::<Vec<_>>();
        output.push('\n');
        output.push_str(&render_table(&headers, &rows));
    }
    if report.suppressed_diagnostics > 0 {
        let _ = writeln!(
            output,
            "... and {} more problem(s) not shown",
            report.suppressed_diagnostics
        );
    }
    output
}

pub fn render_record(record: &StudentRecord) -> String {
    let validation = match (record.is_validated, record.validation_date) {
        (true, Some(ts)) => format!("yes ({})", ts.format("%Y-%m-%d %H:%M:%S")),
        (true, None) => "yes".to_string(),
        (false, _) => "no".to_string(),
    };
    let pairs = [("id", record.id.clone()), ("validated", validation)]
        .into_iter()
        .chain(
            record
                .ordered_fields()
                .map(|(name, value)| (name, value.as_display())),
        );
    two_columns("field", "value", pairs)
}

pub fn render_sheet_listing(listing: &SheetListing) -> String {
    let rows = listing
        .sheets
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let marker = if listing.recommended_sheet.as_deref() == Some(name.as_str()) {
                "*"
            } else {
                ""
            };
            vec![index.to_string(), name.clone(), marker.to_string()]
        })
        .collect::<Vec<_>>();
    let headers = vec![
        "index".to_string(),
        "sheet".to_string(),
        "recommended".to_string(),
    ];
    render_table(&headers, &rows)
}
