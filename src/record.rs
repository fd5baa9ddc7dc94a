use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{coerce::CoercedRow, data::Value, schema::field_spec};

/// How a row updates an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Unset source values leave stored values alone.
    #[default]
    Preserve,
    /// Every mapped column present in the sheet is written, clearing stored
    /// values where the source cell did not coerce.
    Overwrite,
}

/// One student as stored. Attributes absent from `fields` are null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
    pub is_validated: bool,
    pub validation_date: Option<NaiveDateTime>,
}

impl StudentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            is_validated: false,
            validation_date: None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.fields.insert(field.to_string(), value);
            }
            None => {
                self.fields.remove(field);
            }
        }
    }

    /// A fresh record holding only the fields that coerced. Returns `None`
    /// when the row has no usable key.
    pub fn from_row(row: &CoercedRow) -> Option<Self> {
        let id = row.id.clone()?;
        let mut record = StudentRecord::new(id);
        for (field, value) in row.present_values() {
            record.fields.insert(field.to_string(), value.clone());
        }
        Some(record)
    }

    /// Apply a coerced row to this record. Returns the names of the fields
    /// whose stored value changed.
    pub fn merge(&mut self, row: &CoercedRow, mode: MergeMode) -> Vec<&'static str> {
        let mut changed = Vec::new();
        for (field, value) in &row.fields {
            let next = match (value, mode) {
                (Some(value), _) => Some(value.clone()),
                (None, MergeMode::Overwrite) => None,
                (None, MergeMode::Preserve) => continue,
            };
            if self.fields.get(*field) != next.as_ref() {
                self.set(field, next);
                changed.push(*field);
            }
        }
        changed
    }

    /// Fields in table order, followed by anything the catalog does not know.
    pub fn ordered_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        let known = crate::schema::STUDENT_FIELDS
            .iter()
            .filter_map(|spec| self.fields.get(spec.name).map(|value| (spec.name, value)));
        let unknown = self
            .fields
            .iter()
            .filter(|(name, _)| field_spec(name).is_none())
            .map(|(name, value)| (name.as_str(), value));
        known.chain(unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    fn row(id: &str, fields: Vec<(&'static str, Option<Value>)>) -> CoercedRow {
        CoercedRow {
            id: Some(id.to_string()),
            raw_id: Cell::Text(id.to_string()),
            fields,
        }
    }

    #[test]
    fn from_row_keeps_only_coerced_fields() {
        let record = StudentRecord::from_row(&row(
            "T1",
            vec![
                ("programa", Some(Value::String("Derecho".into()))),
                ("estrato", None),
            ],
        ))
        .unwrap();
        assert_eq!(record.fields.len(), 1);
        assert!(!record.is_validated);
        assert!(record.get("estrato").is_none());
    }

    #[test]
    fn from_row_without_key_is_none() {
        let mut keyless = row("T1", vec![]);
        keyless.id = None;
        assert!(StudentRecord::from_row(&keyless).is_none());
    }

    #[test]
    fn preserve_merge_never_erases() {
        let mut record = StudentRecord::new("T1");
        record.set("estrato", Some(Value::Integer(3)));
        let changed = record.merge(
            &row(
                "T1",
                vec![
                    ("estrato", None),
                    ("programa", Some(Value::String("Medicina".into()))),
                ],
            ),
            MergeMode::Preserve,
        );
        assert_eq!(changed, vec!["programa"]);
        assert_eq!(record.get("estrato"), Some(&Value::Integer(3)));
    }

    #[test]
    fn overwrite_merge_clears_present_columns() {
        let mut record = StudentRecord::new("T1");
        record.set("estrato", Some(Value::Integer(3)));
        record.set("sexo", Some(Value::String("F".into())));
        let changed = record.merge(&row("T1", vec![("estrato", None)]), MergeMode::Overwrite);
        assert_eq!(changed, vec!["estrato"]);
        assert!(record.get("estrato").is_none());
        assert_eq!(record.get("sexo"), Some(&Value::String("F".into())));
    }

    #[test]
    fn merge_leaves_validation_state_alone() {
        let mut record = StudentRecord::new("T1");
        record.is_validated = true;
        record.merge(
            &row("T1", vec![("estrato", Some(Value::Integer(2)))]),
            MergeMode::Overwrite,
        );
        assert!(record.is_validated);
    }
}
