//! Typed, named, flagged value holders.

use std::ops::{BitOr, BitOrAssign};
use std::sync::OnceLock;

use crate::error::ColumnError;
use crate::types::{ColumnValue, Datum, SqlType};

/// Column flag set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColumnFlags(u8);

impl ColumnFlags {
    pub const NONE: ColumnFlags = ColumnFlags(0);
    pub const NULLABLE: ColumnFlags = ColumnFlags(0b1);
    pub const AUTO_INCREMENT: ColumnFlags = ColumnFlags(0b10);
    pub const UNIQUE: ColumnFlags = ColumnFlags(0b100);
    pub const READONLY: ColumnFlags = ColumnFlags(0b1000);
    pub const PRIVATE: ColumnFlags = ColumnFlags(0b10000);

    pub fn contains(self, flag: ColumnFlags) -> bool {
        flag.0 != 0 && self.0 & flag.0 == flag.0
    }

    pub fn is_nullable(self) -> bool {
        self.contains(ColumnFlags::NULLABLE)
    }

    pub fn is_private(self) -> bool {
        self.contains(ColumnFlags::PRIVATE)
    }

    /// Not settable from client input.
    pub fn is_protected(self) -> bool {
        self.contains(ColumnFlags::READONLY) || self.contains(ColumnFlags::AUTO_INCREMENT)
    }

    pub fn names(self) -> Vec<&'static str> {
        [
            (ColumnFlags::NULLABLE, "nullable"),
            (ColumnFlags::AUTO_INCREMENT, "auto_increment"),
            (ColumnFlags::UNIQUE, "unique"),
            (ColumnFlags::READONLY, "readonly"),
            (ColumnFlags::PRIVATE, "private"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl BitOr for ColumnFlags {
    type Output = ColumnFlags;

    fn bitor(self, rhs: ColumnFlags) -> ColumnFlags {
        ColumnFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ColumnFlags {
    fn bitor_assign(&mut self, rhs: ColumnFlags) {
        self.0 |= rhs.0;
    }
}

/// Write-once column name. Empty until named explicitly or by discovery.
#[derive(Debug, Default)]
pub(crate) struct ColumnName(OnceLock<String>);

impl ColumnName {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let cell = OnceLock::new();
        if !name.trim().is_empty() {
            let _ = cell.set(name);
        }
        ColumnName(cell)
    }

    pub(crate) fn get(&self) -> &str {
        self.0.get().map(String::as_str).unwrap_or("")
    }

    /// First call wins; later calls are no-ops.
    pub(crate) fn assign(&self, name: &str) {
        let _ = self.0.set(name.to_string());
    }
}

impl Clone for ColumnName {
    fn clone(&self) -> Self {
        ColumnName::new(self.get())
    }
}

/// Type-erased view of a scalar column, used by discovery and the codec.
pub trait ScalarField: Send + Sync {
    fn column_name(&self) -> &str;

    fn set_column_name(&self, name: &str);

    fn sql_type(&self) -> &SqlType;

    fn flags(&self) -> ColumnFlags;

    fn is_null(&self) -> bool;

    fn datum(&self) -> Option<Datum>;

    fn set_datum(&mut self, datum: Option<Datum>) -> Result<(), ColumnError>;
}

/// A column holding an optional `V`.
#[derive(Clone, Debug)]
pub struct Column<V> {
    name: ColumnName,
    sql_type: SqlType,
    flags: ColumnFlags,
    value: Option<V>,
}

impl<V: ColumnValue> Column<V> {
    /// Unnamed column; the name is taken from the declaring field at discovery.
    pub fn new(sql_type: SqlType, flags: ColumnFlags) -> Self {
        Self::named(sql_type, flags, "")
    }

    pub fn named(sql_type: SqlType, flags: ColumnFlags, name: &str) -> Self {
        Column {
            name: ColumnName::new(name),
            sql_type,
            flags,
            value: None,
        }
    }

    pub fn set(&mut self, value: V) {
        self.value = Some(value);
    }

    /// Sets or clears the value.
    pub fn set_value(&mut self, value: Option<V>) {
        self.value = value;
    }

    /// The value; fails when absent.
    pub fn get(&self) -> Result<&V, ColumnError> {
        self.value
            .as_ref()
            .ok_or_else(|| ColumnError::Null(self.name.get().to_string()))
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn take(&mut self) -> Option<V> {
        self.value.take()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn column_name(&self) -> &str {
        self.name.get()
    }

    pub fn set_column_name(&self, name: &str) {
        self.name.assign(name)
    }

    pub fn sql_type(&self) -> &SqlType {
        &self.sql_type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn contains_flag(&self, flag: ColumnFlags) -> bool {
        self.flags.contains(flag)
    }
}

impl<V: ColumnValue> ScalarField for Column<V> {
    fn column_name(&self) -> &str {
        self.name.get()
    }

    fn set_column_name(&self, name: &str) {
        self.name.assign(name)
    }

    fn sql_type(&self) -> &SqlType {
        &self.sql_type
    }

    fn flags(&self) -> ColumnFlags {
        self.flags
    }

    fn is_null(&self) -> bool {
        self.value.is_none()
    }

    fn datum(&self) -> Option<Datum> {
        self.value.as_ref().map(ColumnValue::to_datum)
    }

    fn set_datum(&mut self, datum: Option<Datum>) -> Result<(), ColumnError> {
        match datum {
            None => {
                self.value = None;
                Ok(())
            }
            Some(d) => {
                let v = V::from_datum(d).ok_or_else(|| ColumnError::Mismatch {
                    column: self.name.get().to_string(),
                    expected: V::KIND.to_string(),
                })?;
                self.value = Some(v);
                Ok(())
            }
        }
    }
}

/// Name and type of a column a one-to-many relation may point at.
pub trait KeyColumn {
    fn column_name(&self) -> &str;

    fn sql_type(&self) -> &SqlType;

    /// Current value as a row id, if it holds an integer.
    fn key_value(&self) -> Option<i64>;
}

impl<V: ColumnValue> KeyColumn for Column<V> {
    fn column_name(&self) -> &str {
        self.name.get()
    }

    fn sql_type(&self) -> &SqlType {
        &self.sql_type
    }

    fn key_value(&self) -> Option<i64> {
        match self.value.as_ref().map(ColumnValue::to_datum) {
            Some(Datum::Int(n)) => Some(n),
            _ => None,
        }
    }
}
