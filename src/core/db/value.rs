/// Value Module
///
/// `DbValue` is the nullable "any" carried by parameters and produced when a row is
/// materialized. Values read back from SQLite only ever use the storage classes
/// (`Null`, `Integer`, `Real`, `Text`, `Blob`); the richer variants exist on the
/// way in.
use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Text layout used for datetimes, matching rusqlite's chrono support.
pub(crate) const DATETIME_FORMAT: &str = "%F %T%.f";

/// A nullable database value
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Integer(i) => Some(*i),
            DbValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DbValue::Real(f) => Some(*f),
            DbValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DbValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Converts to the value SQLite stores when no explicit type is declared.
    pub(crate) fn to_storage(&self) -> Value {
        match self {
            DbValue::Null => Value::Null,
            DbValue::Bool(b) => Value::Integer(*b as i64),
            DbValue::Integer(i) => Value::Integer(*i),
            DbValue::Real(f) => Value::Real(*f),
            DbValue::Text(s) => Value::Text(s.clone()),
            DbValue::Blob(b) => Value::Blob(b.clone()),
            DbValue::DateTime(dt) => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
            DbValue::Guid(id) => Value::Text(id.hyphenated().to_string()),
        }
    }
}

impl<'a> From<ValueRef<'a>> for DbValue {
    fn from(value: ValueRef<'a>) -> Self {
        match value {
            ValueRef::Null => DbValue::Null,
            ValueRef::Integer(i) => DbValue::Integer(i),
            ValueRef::Real(f) => DbValue::Real(f),
            ValueRef::Text(t) => DbValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => DbValue::Blob(b.to_vec()),
        }
    }
}

impl ToSql for DbValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DbValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            DbValue::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            DbValue::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            DbValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            DbValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            other => ToSqlOutput::Owned(other.to_storage()),
        })
    }
}

impl Serialize for DbValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DbValue::Null => serializer.serialize_none(),
            DbValue::Bool(b) => serializer.serialize_bool(*b),
            DbValue::Integer(i) => serializer.serialize_i64(*i),
            DbValue::Real(f) => serializer.serialize_f64(*f),
            DbValue::Text(s) => serializer.serialize_str(s),
            DbValue::Blob(b) => serializer.collect_seq(b.iter()),
            DbValue::DateTime(dt) => {
                serializer.serialize_str(&dt.format(DATETIME_FORMAT).to_string())
            }
            DbValue::Guid(id) => serializer.serialize_str(&id.hyphenated().to_string()),
        }
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for DbValue {
                fn from(value: $t) -> Self {
                    DbValue::Integer(value as i64)
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for DbValue {
    fn from(value: bool) -> Self {
        DbValue::Bool(value)
    }
}

impl From<f32> for DbValue {
    fn from(value: f32) -> Self {
        DbValue::Real(value as f64)
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Real(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::Text(value.to_string())
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::Text(value)
    }
}

impl From<&String> for DbValue {
    fn from(value: &String) -> Self {
        DbValue::Text(value.clone())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(value: Vec<u8>) -> Self {
        DbValue::Blob(value)
    }
}

impl From<&[u8]> for DbValue {
    fn from(value: &[u8]) -> Self {
        DbValue::Blob(value.to_vec())
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(value: NaiveDateTime) -> Self {
        DbValue::DateTime(value)
    }
}

impl From<Uuid> for DbValue {
    fn from(value: Uuid) -> Self {
        DbValue::Guid(value)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DbValue::Null)
    }
}
