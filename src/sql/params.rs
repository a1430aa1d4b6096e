//! Convert storage-side JSON cells to values sqlx can bind, and decoded rows back to cells.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgRow, PgTypeInfo, Postgres};
use sqlx::{Database, Row};

use crate::error::BridgeError;
use crate::types::TypeCategory;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value that can be bound to a PostgreSQL query. Text values are cast in SQL.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl PgBindValue {
    pub fn from_cell(v: &Value, category: TypeCategory) -> Result<Self, BridgeError> {
        Ok(match (v, category) {
            (Value::Null, _) => PgBindValue::Null,
            (Value::Bool(b), _) => PgBindValue::Bool(*b),
            (Value::Number(n), _) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else if let Some(f) = n.as_f64() {
                    PgBindValue::F64(f)
                } else {
                    return Err(BridgeError::Backend(format!("unsupported number {}", n)));
                }
            }
            (Value::String(s), _) => PgBindValue::String(s.clone()),
            (Value::Array(items), TypeCategory::Blob) => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    let b = item
                        .as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| BridgeError::Backend(format!("invalid byte {}", item)))?;
                    bytes.push(b);
                }
                PgBindValue::Bytes(bytes)
            }
            (other, _) => return Err(BridgeError::Backend(format!("cannot bind {}", other))),
        })
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Bytes(b) => <Vec<u8> as Encode<Postgres>>::encode_by_ref(b, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => PgTypeInfo::with_name("TEXT"),
            PgBindValue::Bool(_) => PgTypeInfo::with_name("BOOL"),
            PgBindValue::I64(_) => PgTypeInfo::with_name("INT8"),
            PgBindValue::F64(_) => PgTypeInfo::with_name("FLOAT8"),
            PgBindValue::Bytes(_) => PgTypeInfo::with_name("BYTEA"),
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// Decode one column of `row` into its storage-side cell.
pub fn cell_to_value(row: &PgRow, name: &str, category: TypeCategory) -> Result<Value, sqlx::Error> {
    Ok(match category {
        TypeCategory::TinyInt | TypeCategory::SmallInt => {
            row.try_get::<Option<i16>, _>(name)?.map(Value::from).unwrap_or(Value::Null)
        }
        TypeCategory::MediumInt | TypeCategory::Int => {
            row.try_get::<Option<i32>, _>(name)?.map(Value::from).unwrap_or(Value::Null)
        }
        TypeCategory::BigInt => row.try_get::<Option<i64>, _>(name)?.map(Value::from).unwrap_or(Value::Null),
        TypeCategory::Bool => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool).unwrap_or(Value::Null),
        TypeCategory::Float => row
            .try_get::<Option<f32>, _>(name)?
            .and_then(|n| serde_json::Number::from_f64(f64::from(n)))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        TypeCategory::Double => row
            .try_get::<Option<f64>, _>(name)?
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        TypeCategory::VarChar | TypeCategory::Text => {
            row.try_get::<Option<String>, _>(name)?.map(Value::String).unwrap_or(Value::Null)
        }
        TypeCategory::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)?
            .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
            .unwrap_or(Value::Null),
        TypeCategory::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(name)?
            .map(|t| Value::String(t.format(TIME_FORMAT).to_string()))
            .unwrap_or(Value::Null),
        TypeCategory::DateTime => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)?
            .map(|d| Value::String(d.format(DATETIME_FORMAT).to_string()))
            .unwrap_or(Value::Null),
        TypeCategory::Blob => row
            .try_get::<Option<Vec<u8>>, _>(name)?
            .map(|b| Value::Array(b.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null),
    })
}
