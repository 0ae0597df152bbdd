//! Parameter binding for commands.
//!
//! A `ParameterSet` maps parameter names to values and an optional declared
//! `DbType`. Parameters are bound by name onto a prepared statement: every
//! parameter the statement declares must be present, extra entries are ignored.

use crate::core::db::value::{DbValue, DATETIME_FORMAT};
use crate::core::{NestqlError, Result};
use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::Statement;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Declared database type of a parameter.
///
/// Forcing a type matters when a value would otherwise bind as the wrong
/// storage class, e.g. a numeric string that must stay text, or a GUID that
/// must be stored as 16 raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    DateTime,
    Guid,
    Binary,
}

impl DbType {
    /// Converts `value` into the storage value for this declared type.
    ///
    /// NULL stays NULL for every type.
    pub fn coerce(self, value: &DbValue) -> std::result::Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            DbType::Boolean => coerce_bool(value).map(|b| Value::Integer(b as i64)),
            DbType::Byte => coerce_integer(value, u8::MIN as i64, u8::MAX as i64),
            DbType::Int16 => coerce_integer(value, i16::MIN as i64, i16::MAX as i64),
            DbType::Int32 => coerce_integer(value, i32::MIN as i64, i32::MAX as i64),
            DbType::Int64 => coerce_integer(value, i64::MIN, i64::MAX),
            DbType::Single | DbType::Double => coerce_real(value).map(Value::Real),
            DbType::Decimal => coerce_decimal(value),
            DbType::String => coerce_text(value).map(Value::Text),
            DbType::DateTime => coerce_datetime(value)
                .map(|dt| Value::Text(dt.format(DATETIME_FORMAT).to_string())),
            DbType::Guid => coerce_guid(value).map(|id| Value::Text(id.hyphenated().to_string())),
            DbType::Binary => coerce_bytes(value).map(Value::Blob),
        }
    }
}

fn mismatch(value: &DbValue, target: &str) -> String {
    format!("cannot convert {:?} to {}", value, target)
}

fn coerce_bool(value: &DbValue) -> std::result::Result<bool, String> {
    match value {
        DbValue::Bool(b) => Ok(*b),
        DbValue::Integer(i) => Ok(*i != 0),
        DbValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(mismatch(value, "Boolean")),
        },
        _ => Err(mismatch(value, "Boolean")),
    }
}

fn coerce_integer(value: &DbValue, min: i64, max: i64) -> std::result::Result<Value, String> {
    let i = match value {
        DbValue::Bool(b) => *b as i64,
        DbValue::Integer(i) => *i,
        DbValue::Real(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 => {
            *f as i64
        }
        DbValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| mismatch(value, "integer"))?,
        _ => return Err(mismatch(value, "integer")),
    };
    if i < min || i > max {
        return Err(format!("{} is out of range [{}, {}]", i, min, max));
    }
    Ok(Value::Integer(i))
}

fn coerce_real(value: &DbValue) -> std::result::Result<f64, String> {
    match value {
        DbValue::Integer(i) => Ok(*i as f64),
        DbValue::Real(f) => Ok(*f),
        DbValue::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch(value, "floating point")),
        _ => Err(mismatch(value, "floating point")),
    }
}

// Decimals travel as text so no digits are lost to binary floating point.
fn coerce_decimal(value: &DbValue) -> std::result::Result<Value, String> {
    match value {
        DbValue::Integer(i) => Ok(Value::Text(i.to_string())),
        DbValue::Real(f) => Ok(Value::Text(f.to_string())),
        DbValue::Text(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<f64>()
                .map_err(|_| mismatch(value, "Decimal"))?;
            Ok(Value::Text(trimmed.to_string()))
        }
        _ => Err(mismatch(value, "Decimal")),
    }
}

fn coerce_text(value: &DbValue) -> std::result::Result<String, String> {
    Ok(match value {
        DbValue::Bool(b) => b.to_string(),
        DbValue::Integer(i) => i.to_string(),
        DbValue::Real(f) => f.to_string(),
        DbValue::Text(s) => s.clone(),
        DbValue::Blob(b) => String::from_utf8(b.clone()).map_err(|_| mismatch(value, "String"))?,
        DbValue::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        DbValue::Guid(id) => id.hyphenated().to_string(),
        DbValue::Null => unreachable!("NULL is handled before coercion"),
    })
}

pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%F %T%.f", "%FT%T%.f", "%F %R"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

fn coerce_datetime(value: &DbValue) -> std::result::Result<NaiveDateTime, String> {
    match value {
        DbValue::DateTime(dt) => Ok(*dt),
        DbValue::Text(s) => parse_datetime(s).ok_or_else(|| mismatch(value, "DateTime")),
        DbValue::Integer(secs) => chrono::DateTime::from_timestamp(*secs, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| mismatch(value, "DateTime")),
        _ => Err(mismatch(value, "DateTime")),
    }
}

fn coerce_guid(value: &DbValue) -> std::result::Result<Uuid, String> {
    match value {
        DbValue::Guid(id) => Ok(*id),
        DbValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|e| e.to_string()),
        DbValue::Blob(b) => Uuid::from_slice(b).map_err(|e| e.to_string()),
        _ => Err(mismatch(value, "Guid")),
    }
}

fn coerce_bytes(value: &DbValue) -> std::result::Result<Vec<u8>, String> {
    match value {
        DbValue::Blob(b) => Ok(b.clone()),
        DbValue::Text(s) => Ok(s.as_bytes().to_vec()),
        DbValue::Guid(id) => Ok(id.as_bytes().to_vec()),
        _ => Err(mismatch(value, "Binary")),
    }
}

/// A single parameter value with its optional declared type
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: DbValue,
    pub db_type: Option<DbType>,
}

impl ToSql for Parameter {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self.db_type {
            None => self.value.to_sql(),
            Some(db_type) => db_type
                .coerce(&self.value)
                .map(ToSqlOutput::Owned)
                .map_err(|msg| rusqlite::Error::ToSqlConversionFailure(msg.into())),
        }
    }
}

/// Strips the SQLite parameter sigil so `@id`, `:id` and `id` address the same slot.
fn normalize(name: &str) -> &str {
    name.trim_start_matches(|c| matches!(c, ':' | '@' | '$' | '?'))
}

/// Named parameters attached to a command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: BTreeMap<String, Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a parameter, replacing any earlier value under the same name.
    pub fn set(&mut self, name: &str, value: DbValue, db_type: Option<DbType>) {
        self.entries
            .insert(normalize(name).to_string(), Parameter { value, db_type });
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.get(normalize(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Binds every parameter `stmt` declares.
    ///
    /// Anonymous `?` slots are looked up by their 1-based position.
    pub fn bind(&self, stmt: &mut Statement<'_>) -> Result<()> {
        for index in 1..=stmt.parameter_count() {
            let key = match stmt.parameter_name(index) {
                Some(name) => name.to_string(),
                None => index.to_string(),
            };
            let param = self
                .get(&key)
                .ok_or_else(|| NestqlError::MissingParameter(key.clone()))?;
            stmt.raw_bind_parameter(index, param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_last_write_wins() {
        let mut params = ParameterSet::new();
        params.set("@name", "first".into(), None);
        params.set("@name", "second".into(), Some(DbType::String));
        assert_eq!(params.len(), 1);
        let param = params.get("@name").unwrap();
        assert_eq!(param.value, DbValue::Text("second".to_string()));
        assert_eq!(param.db_type, Some(DbType::String));
    }

    #[test]
    fn test_sigils_address_same_parameter() {
        let mut params = ParameterSet::new();
        params.set(":id", 1.into(), None);
        params.set("@id", 2.into(), None);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id").unwrap().value, DbValue::Integer(2));
    }

    #[test]
    fn test_integer_coercion_checks_range() {
        assert_eq!(
            DbType::Int16.coerce(&DbValue::Text("12".into())),
            Ok(Value::Integer(12))
        );
        assert!(DbType::Int16.coerce(&DbValue::Integer(70_000)).is_err());
        assert!(DbType::Byte.coerce(&DbValue::Integer(-1)).is_err());
        assert_eq!(DbType::Int32.coerce(&DbValue::Real(3.0)), Ok(Value::Integer(3)));
        assert!(DbType::Int32.coerce(&DbValue::Real(3.5)).is_err());
    }

    #[test]
    fn test_string_coercion_keeps_numeric_text() {
        assert_eq!(
            DbType::String.coerce(&DbValue::Integer(42)),
            Ok(Value::Text("42".to_string()))
        );
        assert_eq!(DbType::Int64.coerce(&DbValue::Null), Ok(Value::Null));
    }

    #[test]
    fn test_guid_coercion() {
        let id = Uuid::new_v4();
        assert_eq!(
            DbType::Binary.coerce(&DbValue::Guid(id)),
            Ok(Value::Blob(id.as_bytes().to_vec()))
        );
        assert_eq!(
            DbType::Guid.coerce(&DbValue::Blob(id.as_bytes().to_vec())),
            Ok(Value::Text(id.hyphenated().to_string()))
        );
        assert!(DbType::Guid.coerce(&DbValue::Text("not-a-guid".into())).is_err());
    }

    #[test]
    fn test_datetime_and_decimal_coercion() {
        assert_eq!(
            DbType::DateTime.coerce(&DbValue::Text("2024-01-02T03:04:05".into())),
            Ok(Value::Text("2024-01-02 03:04:05".to_string()))
        );
        assert_eq!(
            DbType::Decimal.coerce(&DbValue::Text(" 10.250 ".into())),
            Ok(Value::Text("10.250".to_string()))
        );
        assert!(DbType::Decimal.coerce(&DbValue::Text("ten".into())).is_err());
        assert_eq!(
            DbType::Boolean.coerce(&DbValue::Text("TRUE".into())),
            Ok(Value::Integer(1))
        );
    }

    #[test]
    fn test_bind_by_name_ignores_extras() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT @a + :b").unwrap();
        let mut params = ParameterSet::new();
        params.set("a", 40.into(), None);
        params.set(":b", 2.into(), None);
        params.set("@unused", "ignored".into(), None);
        params.bind(&mut stmt).unwrap();

        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        assert_eq!(row.get::<_, i64>(0).unwrap(), 42);
    }

    #[test]
    fn test_bind_missing_parameter() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT @a, @b").unwrap();
        let mut params = ParameterSet::new();
        params.set("a", 1.into(), None);

        match params.bind(&mut stmt) {
            Err(NestqlError::MissingParameter(name)) => assert_eq!(name, "@b"),
            other => panic!("Expected MissingParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_anonymous_by_position() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ? || ?").unwrap();
        let mut params = ParameterSet::new();
        params.set("1", "ab".into(), None);
        params.set("2", "cd".into(), None);
        params.bind(&mut stmt).unwrap();

        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        assert_eq!(row.get::<_, String>(0).unwrap(), "abcd");
    }

    #[test]
    fn test_conversion_failure_is_driver_error() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT @n").unwrap();
        let mut params = ParameterSet::new();
        params.set("n", "abc".into(), Some(DbType::Int32));

        match params.bind(&mut stmt) {
            Err(NestqlError::Database(rusqlite::Error::ToSqlConversionFailure(_))) => {}
            other => panic!("Expected ToSqlConversionFailure, got {:?}", other),
        }
    }
}
