//! SQLite-backed student store.

use std::{path::Path, sync::OnceLock};

use chrono::NaiveDate;
use itertools::Itertools;
use log::{debug, info};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, params, params_from_iter, types::Value as SqlValue,
};

use crate::{
    data::{Value, parse_calendar, render_number},
    error::StoreError,
    record::StudentRecord,
    schema::{FieldKind, STUDENT_FIELDS},
};

use super::{StoreResult, StudentStore};

pub const TABLE_NAME: &str = "student_data";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ROW_SAVEPOINT: &str = "student_row";

/// Columns preceding the attribute fields in every SELECT.
const LEADING_COLUMNS: usize = 3;

fn create_table_sql() -> String {
    let columns = STUDENT_FIELDS
        .iter()
        .map(|spec| format!("    {} {}", spec.name, spec.kind.sql_type()))
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE_NAME} (\n    id TEXT PRIMARY KEY NOT NULL,\n{columns},\n    is_validated INTEGER NOT NULL DEFAULT 0,\n    validation_date TEXT\n);\nCREATE INDEX IF NOT EXISTS idx_{TABLE_NAME}_codigo_antiguo ON {TABLE_NAME}(codigo_antiguo);"
    )
}

fn select_sql() -> &'static str {
    static SQL: OnceLock<String> = OnceLock::new();
    SQL.get_or_init(|| {
        let fields = STUDENT_FIELDS.iter().map(|spec| spec.name).join(", ");
        format!(
            "SELECT id, is_validated, validation_date, {fields} FROM {TABLE_NAME} WHERE id = ?1"
        )
    })
}

fn insert_sql() -> &'static str {
    static SQL: OnceLock<String> = OnceLock::new();
    SQL.get_or_init(|| {
        let fields = STUDENT_FIELDS.iter().map(|spec| spec.name).join(", ");
        let placeholders = (1..=STUDENT_FIELDS.len() + LEADING_COLUMNS)
            .map(|n| format!("?{n}"))
            .join(", ");
        format!(
            "INSERT INTO {TABLE_NAME} (id, is_validated, validation_date, {fields}) VALUES ({placeholders})"
        )
    })
}

fn update_sql() -> &'static str {
    static SQL: OnceLock<String> = OnceLock::new();
    SQL.get_or_init(|| {
        let assignments = STUDENT_FIELDS
            .iter()
            .enumerate()
            .map(|(idx, spec)| format!("{} = ?{}", spec.name, idx + 2))
            .join(", ");
        format!("UPDATE {TABLE_NAME} SET {assignments} WHERE id = ?1")
    })
}

pub struct SqliteStudentStore {
    conn: Connection,
}

impl SqliteStudentStore {
    /// Open (creating if needed) a database file and make sure the
    /// `student_data` table exists.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self { conn };
        store.ensure_schema()?;
        info!("Opened student store at {path:?}");
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }

    fn ensure_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(&create_table_sql())?;
        Ok(())
    }

    /// Marks a record as validated. Ingestion never calls this.
    pub fn set_validated(&mut self, id: &str, validated: bool) -> StoreResult<()> {
        let stamp = validated.then(|| {
            chrono::Local::now()
                .naive_local()
                .format(TIMESTAMP_FORMAT)
                .to_string()
        });
        let changed = self.conn.execute(
            &format!(
                "UPDATE {TABLE_NAME} SET is_validated = ?2, validation_date = ?3 WHERE id = ?1"
            ),
            params![id, validated, stamp],
        )?;
        if changed == 0 {
            return Err(StoreError::Missing(id.to_string()));
        }
        Ok(())
    }

    fn field_params(record: &StudentRecord) -> impl Iterator<Item = SqlValue> + '_ {
        STUDENT_FIELDS
            .iter()
            .map(|spec| record.get(spec.name).map_or(SqlValue::Null, encode_value))
    }
}

fn encode_value(value: &Value) -> SqlValue {
    match value {
        Value::Boolean(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Integer(number) => SqlValue::Integer(*number),
        Value::Float(number) => SqlValue::Real(*number),
        Value::Date(date) => SqlValue::Text(date.format(DATE_FORMAT).to_string()),
        Value::String(text) => SqlValue::Text(text.clone()),
    }
}

fn decode_value(column: &str, kind: FieldKind, raw: SqlValue) -> StoreResult<Option<Value>> {
    let mismatch = |raw: &SqlValue| StoreError::Decode {
        column: column.to_string(),
        detail: format!("{kind} column holds {raw:?}"),
    };
    let value = match (kind, raw) {
        (_, SqlValue::Null) => return Ok(None),
        (FieldKind::String, SqlValue::Text(text)) => Value::String(text),
        (FieldKind::String, SqlValue::Integer(number)) => Value::String(number.to_string()),
        (FieldKind::String, SqlValue::Real(number)) => Value::String(render_number(number)),
        (FieldKind::Integer, SqlValue::Integer(number)) => Value::Integer(number),
        (FieldKind::Float, SqlValue::Real(number)) => Value::Float(number),
        (FieldKind::Float, SqlValue::Integer(number)) => Value::Float(number as f64),
        (FieldKind::Boolean, SqlValue::Integer(number)) => Value::Boolean(number != 0),
        (FieldKind::Date, SqlValue::Text(text)) => NaiveDate::parse_from_str(&text, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|_| mismatch(&SqlValue::Text(text.clone())))?,
        (_, other) => return Err(mismatch(&other)),
    };
    Ok(Some(value))
}

fn map_insert_error(id: &str, err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Duplicate(id.to_string()),
        _ => StoreError::Sqlite(err),
    }
}

impl StudentStore for SqliteStudentStore {
    fn find(&self, id: &str) -> StoreResult<Option<StudentRecord>> {
        let mut stmt = self.conn.prepare_cached(select_sql())?;
        let row = stmt
            .query_row(params![id], |row| {
                let id: String = row.get(0)?;
                let is_validated: bool = row.get(1)?;
                let validation_date: Option<String> = row.get(2)?;
                let raw = (0..STUDENT_FIELDS.len())
                    .map(|idx| row.get::<_, SqlValue>(idx + LEADING_COLUMNS))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok((id, is_validated, validation_date, raw))
            })
            .optional()?;
        let Some((id, is_validated, validation_date, raw)) = row else {
            return Ok(None);
        };

        let mut record = StudentRecord::new(id);
        record.is_validated = is_validated;
        record.validation_date = validation_date.as_deref().and_then(parse_calendar);
        for (spec, value) in STUDENT_FIELDS.iter().zip(raw) {
            record.set(spec.name, decode_value(spec.name, spec.kind, value)?);
        }
        Ok(Some(record))
    }

    fn insert(&mut self, record: &StudentRecord) -> StoreResult<()> {
        let leading = [
            SqlValue::Text(record.id.clone()),
            SqlValue::Integer(i64::from(record.is_validated)),
            record.validation_date.map_or(SqlValue::Null, |ts| {
                SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string())
            }),
        ];
        let mut stmt = self.conn.prepare_cached(insert_sql())?;
        stmt.execute(params_from_iter(
            leading.into_iter().chain(Self::field_params(record)),
        ))
        .map_err(|err| map_insert_error(&record.id, err))?;
        debug!("Inserted student '{}'", record.id);
        Ok(())
    }

    fn update(&mut self, record: &StudentRecord) -> StoreResult<()> {
        let mut stmt = self.conn.prepare_cached(update_sql())?;
        let changed = stmt.execute(params_from_iter(
            std::iter::once(SqlValue::Text(record.id.clone())).chain(Self::field_params(record)),
        ))?;
        if changed == 0 {
            return Err(StoreError::Missing(record.id.clone()));
        }
        debug!("Updated student '{}'", record.id);
        Ok(())
    }

    fn count(&self) -> StoreResult<usize> {
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {TABLE_NAME}"),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    fn begin_batch(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit_batch(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_batch(&mut self) -> StoreResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn begin_row(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {ROW_SAVEPOINT}"))?;
        Ok(())
    }

    fn release_row(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {ROW_SAVEPOINT}"))?;
        Ok(())
    }

    fn rollback_row(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {ROW_SAVEPOINT}; RELEASE SAVEPOINT {ROW_SAVEPOINT}"
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str) -> StudentRecord {
        let mut record = StudentRecord::new(id);
        record.set("programa", Some(Value::String("Ingenieria".into())));
        record.set("estrato", Some(Value::Integer(3)));
        record.set("pga_acumulado", Some(Value::Float(4.2)));
        record.set("icfes_antes_del_2000", Some(Value::Boolean(false)));
        record.set(
            "fecha_nacimiento",
            Some(Value::Date(NaiveDate::from_ymd_opt(2001, 9, 30).unwrap())),
        );
        record
    }

    #[test]
    fn insert_then_find_round_trips_every_kind() {
        let mut store = SqliteStudentStore::open_in_memory().unwrap();
        let record = student("T000YAHAA");
        store.insert(&record).unwrap();
        let loaded = store.find("T000YAHAA").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.find("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_maps_to_duplicate_error() {
        let mut store = SqliteStudentStore::open_in_memory().unwrap();
        store.insert(&student("T1")).unwrap();
        assert!(matches!(
            store.insert(&student("T1")),
            Err(StoreError::Duplicate(id)) if id == "T1"
        ));
    }

    #[test]
    fn update_of_unknown_id_is_missing() {
        let mut store = SqliteStudentStore::open_in_memory().unwrap();
        assert!(matches!(
            store.update(&student("T404")),
            Err(StoreError::Missing(_))
        ));
    }

    #[test]
    fn update_preserves_validation_flag() {
        let mut store = SqliteStudentStore::open_in_memory().unwrap();
        store.insert(&student("T1")).unwrap();
        store.set_validated("T1", true).unwrap();
        let mut changed = student("T1");
        changed.set("estrato", Some(Value::Integer(5)));
        store.update(&changed).unwrap();
        let loaded = store.find("T1").unwrap().unwrap();
        assert!(loaded.is_validated);
        assert!(loaded.validation_date.is_some());
        assert_eq!(loaded.get("estrato"), Some(&Value::Integer(5)));
    }

    #[test]
    fn row_savepoint_rolls_back_inside_batch() {
        let mut store = SqliteStudentStore::open_in_memory().unwrap();
        store.begin_batch().unwrap();
        store.begin_row().unwrap();
        store.insert(&student("T1")).unwrap();
        store.release_row().unwrap();
        store.begin_row().unwrap();
        store.insert(&student("T2")).unwrap();
        store.rollback_row().unwrap();
        store.commit_batch().unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.find("T2").unwrap().is_none());
    }

    #[test]
    fn batch_rollback_discards_writes() {
        let mut store = SqliteStudentStore::open_in_memory().unwrap();
        store.begin_batch().unwrap();
        store.insert(&student("T1")).unwrap();
        store.rollback_batch().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn table_definition_follows_field_catalog() {
        let sql = create_table_sql();
        assert!(sql.contains("estrato INTEGER"));
        assert!(sql.contains("pga_acumulado REAL"));
        assert!(sql.contains("fecha_nacimiento TEXT"));
        assert!(sql.contains("is_validated INTEGER NOT NULL DEFAULT 0"));
    }
}
