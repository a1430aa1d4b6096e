//! SQL-like scalar types: validation plus import/export between cells and wire values.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use super::Datum;
use crate::error::{ConfigError, ImportError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage category. Validation and coercion depend only on the category and the size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Bool,
    Float,
    Double,
    VarChar,
    Text,
    Date,
    Time,
    DateTime,
    Blob,
}

impl TypeCategory {
    /// Inclusive bounds for integer categories.
    pub fn int_range(self) -> Option<(i64, i64)> {
        match self {
            TypeCategory::TinyInt => Some((-128, 127)),
            TypeCategory::SmallInt => Some((-32_768, 32_767)),
            TypeCategory::MediumInt => Some((-8_388_608, 8_388_607)),
            TypeCategory::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            TypeCategory::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, TypeCategory::Date | TypeCategory::Time | TypeCategory::DateTime)
    }
}

/// Immutable column type descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SqlType {
    name: Cow<'static, str>,
    category: TypeCategory,
    size: Option<u32>,
}

impl SqlType {
    pub const TINYINT: SqlType = SqlType::fixed("TINYINT", TypeCategory::TinyInt);
    pub const SMALLINT: SqlType = SqlType::fixed("SMALLINT", TypeCategory::SmallInt);
    pub const MEDIUMINT: SqlType = SqlType::fixed("MEDIUMINT", TypeCategory::MediumInt);
    pub const INT: SqlType = SqlType::fixed("INT", TypeCategory::Int);
    pub const BIGINT: SqlType = SqlType::fixed("BIGINT", TypeCategory::BigInt);
    pub const BOOL: SqlType = SqlType::fixed("TINYINT", TypeCategory::Bool);
    pub const FLOAT: SqlType = SqlType::fixed("FLOAT", TypeCategory::Float);
    pub const DOUBLE: SqlType = SqlType::fixed("DOUBLE", TypeCategory::Double);
    pub const TEXT: SqlType = SqlType::fixed("TEXT", TypeCategory::Text);
    pub const DATE: SqlType = SqlType::fixed("DATE", TypeCategory::Date);
    pub const TIME: SqlType = SqlType::fixed("TIME", TypeCategory::Time);
    pub const DATETIME: SqlType = SqlType::fixed("DATETIME", TypeCategory::DateTime);
    pub const BLOB: SqlType = SqlType::fixed("LONGBLOB", TypeCategory::Blob);

    const fn fixed(name: &'static str, category: TypeCategory) -> Self {
        SqlType {
            name: Cow::Borrowed(name),
            category,
            size: None,
        }
    }

    /// Variable-length string holding at most `size` characters.
    pub fn varchar(size: u32) -> Self {
        SqlType {
            name: Cow::Owned(format!("VARCHAR({})", size)),
            category: TypeCategory::VarChar,
            size: Some(size),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }

    /// JSON-schema type of the exported wire value.
    pub fn json_type(&self) -> &'static str {
        match self.category {
            TypeCategory::TinyInt
            | TypeCategory::SmallInt
            | TypeCategory::MediumInt
            | TypeCategory::Int
            | TypeCategory::BigInt => "integer",
            TypeCategory::Bool => "boolean",
            TypeCategory::Float | TypeCategory::Double => "number",
            TypeCategory::Blob => "array",
            _ => "string",
        }
    }

    /// JSON-schema `format` hint, when one applies.
    pub fn json_format(&self) -> Option<&'static str> {
        match self.category {
            TypeCategory::Int => Some("int32"),
            TypeCategory::BigInt => Some("int64"),
            TypeCategory::Float => Some("float"),
            TypeCategory::Double => Some("double"),
            TypeCategory::Date => Some("date"),
            TypeCategory::Time => Some("time"),
            TypeCategory::DateTime => Some("date-time"),
            _ => None,
        }
    }

    pub fn validate(&self, value: &Datum) -> bool {
        match (self.category, value) {
            (c, Datum::Int(n)) if c.int_range().is_some() => {
                let (min, max) = c.int_range().unwrap_or((i64::MIN, i64::MAX));
                *n >= min && *n <= max
            }
            (TypeCategory::Bool, Datum::Bool(_)) => true,
            (TypeCategory::Float | TypeCategory::Double, Datum::Float(f)) => f.is_finite(),
            (TypeCategory::Float | TypeCategory::Double, Datum::Int(_)) => true,
            (TypeCategory::VarChar, Datum::Text(s)) => {
                let max = self.size.unwrap_or(0) as usize;
                s.chars().count() <= max
            }
            (TypeCategory::Text, Datum::Text(_)) => true,
            (TypeCategory::Date, Datum::Date(_)) => true,
            (TypeCategory::Time, Datum::Time(_)) => true,
            (TypeCategory::DateTime, Datum::DateTime(_)) => true,
            (TypeCategory::Blob, Datum::Blob(_)) => true,
            _ => false,
        }
    }

    /// Wire representation of `value`; `None` whenever `validate` fails.
    pub fn export(&self, value: &Datum) -> Option<Value> {
        if !self.validate(value) {
            return None;
        }
        Some(match value {
            Datum::Int(n) => Value::from(*n),
            Datum::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number)?,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Text(s) => Value::String(s.clone()),
            Datum::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            Datum::Time(t) => Value::String(t.format(TIME_FORMAT).to_string()),
            Datum::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            Datum::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        })
    }

    /// Parse a wire value. `Ok(None)` for JSON null.
    pub fn import(&self, wire: &Value) -> Result<Option<Datum>, ImportError> {
        if wire.is_null() {
            return Ok(None);
        }
        let datum = match self.category {
            c if c.int_range().is_some() => {
                let n = wire.as_i64().ok_or_else(|| wrong_kind("integer", wire))?;
                let (min, max) = c.int_range().unwrap_or((i64::MIN, i64::MAX));
                if n < min || n > max {
                    return Err(ImportError::OutOfRange {
                        value: n.to_string(),
                        sql_type: self.name().to_string(),
                    });
                }
                Datum::Int(n)
            }
            TypeCategory::Bool => match wire {
                Value::Bool(b) => Datum::Bool(*b),
                Value::Number(n) if n.as_i64() == Some(0) => Datum::Bool(false),
                Value::Number(n) if n.as_i64() == Some(1) => Datum::Bool(true),
                _ => return Err(wrong_kind("boolean", wire)),
            },
            TypeCategory::Float | TypeCategory::Double => {
                Datum::Float(wire.as_f64().ok_or_else(|| wrong_kind("number", wire))?)
            }
            TypeCategory::VarChar | TypeCategory::Text => {
                Datum::Text(wire.as_str().ok_or_else(|| wrong_kind("string", wire))?.to_string())
            }
            TypeCategory::Date => {
                let s = wire.as_str().ok_or_else(|| wrong_kind("string", wire))?;
                Datum::Date(parse_date(s).ok_or_else(|| ImportError::WrongDate(s.to_string()))?)
            }
            TypeCategory::Time => {
                let s = wire.as_str().ok_or_else(|| wrong_kind("string", wire))?;
                Datum::Time(parse_time(s).ok_or_else(|| ImportError::WrongTime(s.to_string()))?)
            }
            TypeCategory::DateTime => {
                let s = wire.as_str().ok_or_else(|| wrong_kind("string", wire))?;
                Datum::DateTime(parse_datetime(s).ok_or_else(|| ImportError::WrongDateTime(s.to_string()))?)
            }
            TypeCategory::Blob => {
                let items = wire.as_array().ok_or_else(|| wrong_kind("array", wire))?;
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    let b = item
                        .as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| wrong_kind("byte", item))?;
                    bytes.push(b);
                }
                Datum::Blob(bytes)
            }
            _ => return Err(wrong_kind("scalar", wire)),
        };
        Ok(Some(datum))
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parses declarations such as `BIGINT`, `varchar(64)` or `DATETIME`.
impl FromStr for SqlType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decl = s.trim();
        let upper = decl.to_uppercase();
        if let Some(rest) = upper.strip_prefix("VARCHAR") {
            let size = rest
                .trim()
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| ConfigError::UnknownType(decl.to_string()))?
                .trim();
            let size: u32 = size.parse().map_err(|_| ConfigError::InvalidSize(size.to_string()))?;
            return Ok(SqlType::varchar(size));
        }
        Ok(match upper.as_str() {
            "TINYINT" => SqlType::TINYINT,
            "SMALLINT" => SqlType::SMALLINT,
            "MEDIUMINT" => SqlType::MEDIUMINT,
            "INT" | "INTEGER" => SqlType::INT,
            "BIGINT" => SqlType::BIGINT,
            "BOOL" | "BOOLEAN" => SqlType::BOOL,
            "FLOAT" => SqlType::FLOAT,
            "DOUBLE" => SqlType::DOUBLE,
            "TEXT" => SqlType::TEXT,
            "DATE" => SqlType::DATE,
            "TIME" => SqlType::TIME,
            "DATETIME" => SqlType::DATETIME,
            "BLOB" | "LONGBLOB" => SqlType::BLOB,
            _ => return Err(ConfigError::UnknownType(decl.to_string())),
        })
    }
}

fn wrong_kind(expected: &'static str, found: &Value) -> ImportError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ImportError::WrongKind { expected, found }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S%.f"))
        .ok()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}
