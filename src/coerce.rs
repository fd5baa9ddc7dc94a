//! Cell coercion: raw [`Cell`]s in, typed [`Value`]s or nothing out.
//!
//! Every function here is total. A cell that cannot be read as the requested
//! kind becomes `None`; there are no zero or `false` placeholders, so a
//! missing GPA never looks like a failing one.

use std::{collections::HashSet, sync::OnceLock};

use chrono::NaiveTime;
use regex::Regex;

use crate::{
    data::{Cell, Value, parse_calendar, render_number},
    schema::{ColumnPlan, FieldKind},
};

pub const DEFAULT_SENTINELS: &[&str] = &["nan", "nat", "none", "<na>"];

const TRUTHY_TOKENS: &[&str] = &["true", "1", "yes", "si", "sí"];
const FALSY_TOKENS: &[&str] = &["false", "0", "no"];

fn integer_literal() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)$").expect("integer literal pattern is valid")
    })
}

fn float_literal() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$")
            .expect("float literal pattern is valid")
    })
}

#[derive(Debug, Clone)]
pub struct Coercer {
    sentinels: HashSet<String>,
}

impl Default for Coercer {
    fn default() -> Self {
        Self::with_sentinels(DEFAULT_SENTINELS.iter().copied())
    }
}

impl Coercer {
    pub fn with_sentinels<I, S>(sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sentinels: sentinels
                .into_iter()
                .map(|token| token.as_ref().trim().to_lowercase())
                .filter(|token| !token.is_empty())
                .collect(),
        }
    }

    pub fn is_sentinel(&self, text: &str) -> bool {
        self.sentinels.contains(&text.to_lowercase())
    }

    /// Trimmed text, or `None` when empty or a "not available" marker.
    fn clean_text<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.is_sentinel(trimmed) {
            None
        } else {
            Some(trimmed)
        }
    }

    pub fn coerce(&self, cell: &Cell, kind: FieldKind) -> Option<Value> {
        match kind {
            FieldKind::String => self.coerce_string(cell).map(Value::String),
            FieldKind::Integer => self.coerce_integer(cell).map(Value::Integer),
            FieldKind::Float => self.coerce_float(cell).map(Value::Float),
            FieldKind::Date => self.coerce_date(cell).map(Value::Date),
            FieldKind::Boolean => self.coerce_boolean(cell).map(Value::Boolean),
        }
    }

    pub fn coerce_string(&self, cell: &Cell) -> Option<String> {
        match cell {
            Cell::Missing => None,
            Cell::Text(text) => self.clean_text(text).map(str::to_string),
            Cell::Number(number) if number.is_finite() => Some(render_number(*number)),
            Cell::Number(_) => None,
            Cell::Boolean(flag) => Some(flag.to_string()),
            Cell::Temporal(ts) => Some(if ts.time() == NaiveTime::MIN {
                ts.format("%Y-%m-%d").to_string()
            } else {
                ts.format("%Y-%m-%d %H:%M:%S").to_string()
            }),
        }
    }

    pub fn coerce_integer(&self, cell: &Cell) -> Option<i64> {
        match cell {
            Cell::Number(number) => truncate_to_i64(*number),
            Cell::Text(text) => {
                let cleaned = self.clean_text(text)?;
                if !integer_literal().is_match(cleaned) {
                    return None;
                }
                cleaned.parse::<f64>().ok().and_then(truncate_to_i64)
            }
            Cell::Missing | Cell::Boolean(_) | Cell::Temporal(_) => None,
        }
    }

    pub fn coerce_float(&self, cell: &Cell) -> Option<f64> {
        match cell {
            Cell::Number(number) if number.is_finite() => Some(*number),
            Cell::Text(text) => {
                let cleaned = self.clean_text(text)?;
                if !float_literal().is_match(cleaned) {
                    return None;
                }
                cleaned.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
            }
            _ => None,
        }
    }

    pub fn coerce_date(&self, cell: &Cell) -> Option<chrono::NaiveDate> {
        match cell {
            Cell::Temporal(ts) => Some(ts.date()),
            Cell::Text(text) => parse_calendar(self.clean_text(text)?).map(|ts| ts.date()),
            _ => None,
        }
    }

    /// Tri-state on purpose: a token outside both lists is unknown, not `false`.
    pub fn coerce_boolean(&self, cell: &Cell) -> Option<bool> {
        match cell {
            Cell::Boolean(flag) => Some(*flag),
            Cell::Number(number) if *number == 1.0 => Some(true),
            Cell::Number(number) if *number == 0.0 => Some(false),
            Cell::Text(text) => {
                let lowered = self.clean_text(text)?.to_lowercase();
                if TRUTHY_TOKENS.contains(&lowered.as_str()) {
                    Some(true)
                } else if FALSY_TOKENS.contains(&lowered.as_str()) {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Coerce one source row through a resolved column plan.
    pub fn coerce_row(&self, plan: &ColumnPlan, cells: &[Cell]) -> CoercedRow {
        let cell_at = |index: usize| cells.get(index).unwrap_or(&Cell::Missing);
        let raw_id = cell_at(plan.id_index).clone();
        let id = self.coerce_string(&raw_id);
        let fields = plan
            .bindings
            .iter()
            .map(|binding| (binding.field, self.coerce(cell_at(binding.index), binding.kind)))
            .collect();
        CoercedRow { id, raw_id, fields }
    }
}

fn truncate_to_i64(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    // i64::MAX is not representable as f64; the bound is exclusive at 2^63
    if truncated >= -9_223_372_036_854_775_808.0 && truncated < 9_223_372_036_854_775_808.0 {
        Some(truncated as i64)
    } else {
        None
    }
}

/// Coerce with the default sentinel set.
pub fn coerce(cell: &Cell, kind: FieldKind) -> Option<Value> {
    static DEFAULT: OnceLock<Coercer> = OnceLock::new();
    DEFAULT.get_or_init(Coercer::default).coerce(cell, kind)
}

/// A source row after coercion. `fields` holds one entry per mapped column
/// present in the sheet, `None` where the cell did not coerce.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedRow {
    pub id: Option<String>,
    pub raw_id: Cell,
    pub fields: Vec<(&'static str, Option<Value>)>,
}

impl CoercedRow {
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn present_values(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (*name, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    #[test]
    fn string_trims_and_drops_sentinels() {
        let coercer = Coercer::default();
        assert_eq!(coercer.coerce_string(&text("  Ingenieria ")), Some("Ingenieria".into()));
        assert_eq!(coercer.coerce_string(&text("NaN")), None);
        assert_eq!(coercer.coerce_string(&text(" <NA> ")), None);
        assert_eq!(coercer.coerce_string(&text("None")), None);
        assert_eq!(coercer.coerce_string(&text("   ")), None);
        assert_eq!(coercer.coerce_string(&Cell::Number(3001234567.0)), Some("3001234567".into()));
    }

    #[test]
    fn integer_truncates_numeric_forms() {
        let coercer = Coercer::default();
        assert_eq!(coercer.coerce_integer(&Cell::Number(3.9)), Some(3));
        assert_eq!(coercer.coerce_integer(&Cell::Number(-3.9)), Some(-3));
        assert_eq!(coercer.coerce_integer(&text("18.0")), Some(18));
        assert_eq!(coercer.coerce_integer(&text("+4")), Some(4));
        assert_eq!(coercer.coerce_integer(&text("4 creditos")), None);
        assert_eq!(coercer.coerce_integer(&text("1e3")), None);
        assert_eq!(coercer.coerce_integer(&Cell::Boolean(true)), None);
        assert_eq!(coercer.coerce_integer(&Cell::Number(1e300)), None);
    }

    #[test]
    fn float_accepts_scientific_notation() {
        let coercer = Coercer::default();
        assert_eq!(coercer.coerce_float(&text("4.25")), Some(4.25));
        assert_eq!(coercer.coerce_float(&text("-1.5E2")), Some(-150.0));
        assert_eq!(coercer.coerce_float(&text("inf")), None);
        assert_eq!(coercer.coerce_float(&text("1e999")), None);
        assert_eq!(coercer.coerce_float(&text("3,5")), None);
    }

    #[test]
    fn date_reads_text_and_temporal_cells() {
        let coercer = Coercer::default();
        let expected = NaiveDate::from_ymd_opt(2001, 9, 30).unwrap();
        assert_eq!(coercer.coerce_date(&text("30/09/2001")), Some(expected));
        assert_eq!(
            coercer.coerce_date(&Cell::Temporal(expected.and_hms_opt(10, 0, 0).unwrap())),
            Some(expected)
        );
        assert_eq!(coercer.coerce_date(&text("NaT")), None);
        assert_eq!(coercer.coerce_date(&text("pronto")), None);
        assert_eq!(coercer.coerce_date(&Cell::Number(37164.0)), None);
    }

    #[test]
    fn date_reads_two_digit_years_as_recent_centuries() {
        let coercer = Coercer::default();
        assert_eq!(
            coercer.coerce_date(&text("30/09/01")),
            NaiveDate::from_ymd_opt(2001, 9, 30)
        );
        assert_eq!(
            coercer.coerce_date(&text("5/6/03")),
            NaiveDate::from_ymd_opt(2003, 6, 5)
        );
        assert_eq!(
            coercer.coerce_date(&text("14-03-02")),
            NaiveDate::from_ymd_opt(2002, 3, 14)
        );
        assert_eq!(
            coercer.coerce_date(&text("30/09/2001 08:15")),
            NaiveDate::from_ymd_opt(2001, 9, 30)
        );
    }

    #[test]
    fn date_rejects_implausible_years() {
        let coercer = Coercer::default();
        assert_eq!(coercer.coerce_date(&text("30/09/201")), None);
        assert_eq!(coercer.coerce_date(&text("0001-09-30")), None);
        assert_eq!(coercer.coerce_date(&text("30/09/2999")), None);
    }

    #[test]
    fn boolean_keeps_unknown_tokens_unset() {
        let coercer = Coercer::default();
        assert_eq!(coercer.coerce_boolean(&text("Sí")), Some(true));
        assert_eq!(coercer.coerce_boolean(&text("SI")), Some(true));
        assert_eq!(coercer.coerce_boolean(&text("no")), Some(false));
        assert_eq!(coercer.coerce_boolean(&text("0")), Some(false));
        assert_eq!(coercer.coerce_boolean(&Cell::Boolean(false)), Some(false));
        assert_eq!(coercer.coerce_boolean(&text("tal vez")), None);
        assert_eq!(coercer.coerce_boolean(&text("n")), None);
        assert_eq!(coercer.coerce_boolean(&Cell::Number(2.0)), None);
    }

    #[test]
    fn custom_sentinels_replace_defaults() {
        let coercer = Coercer::with_sentinels(["SIN DATO"]);
        assert_eq!(coercer.coerce_string(&text("sin dato")), None);
        assert_eq!(coercer.coerce_string(&text("nan")), Some("nan".into()));
    }

    proptest! {
        #[test]
        fn non_finite_numbers_never_coerce(value in prop_oneof![
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(f64::NAN),
        ]) {
            for kind in [FieldKind::Integer, FieldKind::Float, FieldKind::String] {
                prop_assert_eq!(coerce(&Cell::Number(value), kind), None);
            }
        }

        #[test]
        fn finite_integers_survive_as_text(value in -1_000_000_000i64..1_000_000_000i64) {
            let cell = Cell::Text(format!(" {value} "));
            prop_assert_eq!(coerce(&cell, FieldKind::Integer), Some(Value::Integer(value)));
            prop_assert_eq!(coerce(&cell, FieldKind::Float), Some(Value::Float(value as f64)));
        }

        #[test]
        fn coercion_never_panics(raw in ".*") {
            let cell = Cell::Text(raw);
            for kind in [
                FieldKind::String,
                FieldKind::Integer,
                FieldKind::Float,
                FieldKind::Date,
                FieldKind::Boolean,
            ] {
                let _ = coerce(&cell, kind);
            }
        }
    }
}
