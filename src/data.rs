use std::{fmt, ops::RangeInclusive};

use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A raw cell as read from the source sheet, before any target type is known.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Text(String),
    Number(f64),
    Temporal(NaiveDateTime),
    Boolean(bool),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Missing, or text made only of whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn from_text(raw: &str) -> Self {
        if raw.is_empty() {
            Cell::Missing
        } else {
            Cell::Text(raw.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => write!(f, "<missing>"),
            Cell::Text(text) => write!(f, "{text:?}"),
            Cell::Number(number) => write!(f, "{number}"),
            Cell::Temporal(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Cell::Boolean(flag) => write!(f, "{flag}"),
        }
    }
}

/// A coerced, strongly typed field value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    String(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => render_number(*f),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Whole numbers lose their trailing `.0`; spreadsheets store phone numbers
/// and codes as floats.
pub fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Two-digit-year forms come before their `%Y` counterparts: `%Y` also
/// accepts one or two digits and would read `01` as year 1.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%m-%y",
    "%d-%m-%Y",
    "%d.%m.%y",
    "%d.%m.%Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%y %H:%M",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Years outside this window come from truncated or mistyped input.
const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1900..=2100;

fn plausible(date: NaiveDate) -> bool {
    PLAUSIBLE_YEARS.contains(&date.year())
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Some(parsed) = NaiveDate::parse_from_str(value, fmt)
            .ok()
            .filter(|date| plausible(*date))
        {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Some(parsed) = NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .filter(|ts| plausible(ts.date()))
        {
            return Ok(parsed);
        }
    }
    // RFC 3339 with offset, as produced by some exporters
    if let Some(parsed) = chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.naive_utc())
        .filter(|ts| plausible(ts.date()))
    {
        return Ok(parsed);
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Best-effort calendar parse: a bare date or a date with a time component.
pub fn parse_calendar(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_naive_date(trimmed)
        .map(|date| date.and_time(NaiveTime::MIN))
        .or_else(|_| parse_naive_datetime(trimmed))
        .ok()
}
