/// Row Reader Module
///
/// A `RowReader` is a read-only view over the cursor's current row. It borrows
/// the live `rusqlite::Row`, so it cannot outlive the callback it is handed to.
use crate::core::db::value::DbValue;
use crate::core::{NestqlError, Result};
use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, Type, ValueRef};
use rusqlite::Row;
use serde::ser::{Serialize, SerializeMap, Serializer};
use uuid::Uuid;

/// Addresses a field either by ordinal or by column name.
pub trait FieldIndex {
    fn ordinal(&self, row: &RowReader<'_, '_>) -> Result<usize>;
}

impl FieldIndex for usize {
    fn ordinal(&self, _row: &RowReader<'_, '_>) -> Result<usize> {
        Ok(*self)
    }
}

impl FieldIndex for &str {
    fn ordinal(&self, row: &RowReader<'_, '_>) -> Result<usize> {
        row.ordinal(self)
    }
}

impl FieldIndex for &String {
    fn ordinal(&self, row: &RowReader<'_, '_>) -> Result<usize> {
        row.ordinal(self)
    }
}

/// How field names are compared when a row is materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameComparison {
    #[default]
    CaseInsensitive,
    CaseSensitive,
}

impl NameComparison {
    fn matches(self, a: &str, b: &str) -> bool {
        match self {
            NameComparison::CaseSensitive => a == b,
            NameComparison::CaseInsensitive => a == b || a.to_lowercase() == b.to_lowercase(),
        }
    }
}

/// Forward-only view of the active row
pub struct RowReader<'r, 's> {
    row: &'r Row<'s>,
}

impl<'r, 's> RowReader<'r, 's> {
    pub(crate) fn new(row: &'r Row<'s>) -> Self {
        RowReader { row }
    }

    pub fn field_count(&self) -> usize {
        self.row.as_ref().column_count()
    }

    pub fn field_name(&self, ordinal: usize) -> Result<&str> {
        Ok(self.row.as_ref().column_name(ordinal)?)
    }

    /// Resolves a column name to its ordinal.
    ///
    /// An exact match wins over a case-insensitive one.
    pub fn ordinal(&self, name: &str) -> Result<usize> {
        let names = self.row.as_ref().column_names();
        names
            .iter()
            .position(|n| *n == name)
            .or_else(|| {
                names
                    .iter()
                    .position(|n| NameComparison::CaseInsensitive.matches(n, name))
            })
            .ok_or_else(|| NestqlError::FieldNotFound(name.to_string()))
    }

    /// Reads a field through rusqlite's `FromSql` conversions.
    pub fn get<T: FromSql, I: FieldIndex>(&self, index: I) -> Result<T> {
        let ordinal = index.ordinal(self)?;
        Ok(self.row.get(ordinal)?)
    }

    fn value_ref<I: FieldIndex>(&self, index: I) -> Result<(usize, ValueRef<'_>)> {
        let ordinal = index.ordinal(self)?;
        Ok((ordinal, self.row.get_ref(ordinal)?))
    }

    fn invalid_type(&self, ordinal: usize, value: ValueRef<'_>) -> NestqlError {
        let name = self.field_name(ordinal).unwrap_or_default().to_string();
        rusqlite::Error::InvalidColumnType(ordinal, name, value.data_type()).into()
    }

    pub fn is_null<I: FieldIndex>(&self, index: I) -> Result<bool> {
        let (_, value) = self.value_ref(index)?;
        Ok(value == ValueRef::Null)
    }

    pub fn get_bool<I: FieldIndex>(&self, index: I) -> Result<bool> {
        self.get(index)
    }

    pub fn get_u8<I: FieldIndex>(&self, index: I) -> Result<u8> {
        self.get(index)
    }

    pub fn get_i16<I: FieldIndex>(&self, index: I) -> Result<i16> {
        self.get(index)
    }

    pub fn get_i32<I: FieldIndex>(&self, index: I) -> Result<i32> {
        self.get(index)
    }

    pub fn get_i64<I: FieldIndex>(&self, index: I) -> Result<i64> {
        self.get(index)
    }

    /// Reads a floating point field, rejecting finite values `f32` cannot hold.
    pub fn get_f32<I: FieldIndex>(&self, index: I) -> Result<f32> {
        let ordinal = index.ordinal(self)?;
        let value = self.get_f64(ordinal)?;
        if value.is_finite() && value.abs() > f32::MAX as f64 {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                ordinal,
                Type::Real,
                format!("{} is out of range for f32", value).into(),
            )
            .into());
        }
        Ok(value as f32)
    }

    pub fn get_f64<I: FieldIndex>(&self, index: I) -> Result<f64> {
        self.get(index)
    }

    /// Reads a decimal field as exact text.
    ///
    /// SQLite has no decimal storage class; values written with
    /// `DbType::Decimal` are stored as text and come back unchanged.
    pub fn get_decimal<I: FieldIndex>(&self, index: I) -> Result<String> {
        let (ordinal, value) = self.value_ref(index)?;
        match value {
            ValueRef::Integer(i) => Ok(i.to_string()),
            ValueRef::Real(f) => Ok(f.to_string()),
            ValueRef::Text(t) => {
                let text = String::from_utf8_lossy(t).trim().to_string();
                text.parse::<f64>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(ordinal, Type::Text, Box::new(e))
                })?;
                Ok(text)
            }
            other => Err(self.invalid_type(ordinal, other)),
        }
    }

    pub fn get_string<I: FieldIndex>(&self, index: I) -> Result<String> {
        self.get(index)
    }

    pub fn get_datetime<I: FieldIndex>(&self, index: I) -> Result<NaiveDateTime> {
        self.get(index)
    }

    /// Reads a GUID stored either as hyphenated text or as 16 raw bytes.
    pub fn get_guid<I: FieldIndex>(&self, index: I) -> Result<Uuid> {
        let (ordinal, value) = self.value_ref(index)?;
        let parsed = match value {
            ValueRef::Text(t) => Uuid::try_parse_ascii(t),
            ValueRef::Blob(b) => Uuid::from_slice(b),
            other => return Err(self.invalid_type(ordinal, other)),
        };
        parsed.map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(ordinal, value.data_type(), Box::new(e))
                .into()
        })
    }

    pub fn get_bytes<I: FieldIndex>(&self, index: I) -> Result<Vec<u8>> {
        self.get(index)
    }

    /// Reads a single-character text field.
    pub fn get_char<I: FieldIndex>(&self, index: I) -> Result<char> {
        let ordinal = index.ordinal(self)?;
        let text = self.get_string(ordinal)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(rusqlite::Error::FromSqlConversionFailure(
                ordinal,
                Type::Text,
                format!("expected a single character, got {:?}", text).into(),
            )
            .into()),
        }
    }

    pub fn get_value<I: FieldIndex>(&self, index: I) -> Result<DbValue> {
        let (_, value) = self.value_ref(index)?;
        Ok(DbValue::from(value))
    }

    /// Reads every field of the row, in column order.
    pub fn get_values(&self) -> Result<Vec<DbValue>> {
        (0..self.field_count()).map(|i| self.get_value(i)).collect()
    }

    /// Storage class of the field's current value.
    pub fn field_type<I: FieldIndex>(&self, index: I) -> Result<Type> {
        let (_, value) = self.value_ref(index)?;
        Ok(value.data_type())
    }

    /// Declared type of the column the field comes from, as written in its
    /// table definition. Expressions and untyped columns have none.
    pub fn field_decl_type<I: FieldIndex>(&self, index: I) -> Result<Option<String>> {
        let ordinal = index.ordinal(self)?;
        let columns = self.row.as_ref().columns();
        let column = columns
            .get(ordinal)
            .ok_or(rusqlite::Error::InvalidColumnIndex(ordinal))?;
        Ok(column.decl_type().map(str::to_string))
    }

    /// Materializes the row with case-insensitive field names.
    pub fn to_record(&self) -> Result<Record> {
        self.to_record_with(NameComparison::default())
    }

    pub fn to_record_with(&self, comparison: NameComparison) -> Result<Record> {
        let mut record = Record::with_comparison(comparison);
        for ordinal in 0..self.field_count() {
            let name = self.field_name(ordinal)?.to_string();
            record.insert(name, self.get_value(ordinal)?);
        }
        Ok(record)
    }
}

/// An owned snapshot of a row: field names paired with values, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, DbValue)>,
    comparison: NameComparison,
}

impl Record {
    pub fn with_comparison(comparison: NameComparison) -> Self {
        Record {
            fields: Vec::new(),
            comparison,
        }
    }

    /// Sets a field; a name equal under the record's comparison is replaced.
    pub fn insert(&mut self, name: String, value: DbValue) {
        let comparison = self.comparison;
        match self
            .fields
            .iter_mut()
            .find(|(existing, _)| comparison.matches(existing, &name))
        {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.fields
            .iter()
            .find(|(existing, _)| self.comparison.matches(existing, name))
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl std::ops::Index<&str> for Record {
    type Output = DbValue;

    fn index(&self, name: &str) -> &DbValue {
        match self.get(name) {
            Some(value) => value,
            None => panic!("no field named {:?} in record", name),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
