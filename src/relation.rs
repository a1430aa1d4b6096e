//! Foreign-key columns: one-to-one links and one-to-many reverse views.

use async_trait::async_trait;
use serde_json::Value;

use crate::column::{ColumnFlags, ColumnName, KeyColumn};
use crate::error::{ColumnError, ConfigError, EngineError};
use crate::security::Authentication;
use crate::service::Engine;
use crate::table::{assign_names, Table};
use crate::types::{SqlType, TypeCategory};

/// When a relation is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Resolved automatically after select.
    #[default]
    Direct,
    /// Resolved only on explicit request.
    Lazy,
}

/// Type-erased view of a one-to-one relation.
#[async_trait]
pub trait OneToOneField: Send + Sync {
    fn column_name(&self) -> &str;

    fn set_column_name(&self, name: &str);

    /// Name of the expanded (nested) reference.
    fn ref_name(&self) -> &str;

    fn flags(&self) -> ColumnFlags;

    fn mode(&self) -> LoadMode;

    /// Table name of the referenced type.
    fn target(&self) -> String;

    fn key(&self) -> Option<i64>;

    fn set_key(&mut self, key: Option<i64>) -> Result<(), ColumnError>;

    /// Clears the key without the nullability check; used when loading stored rows.
    fn clear_key(&mut self);

    fn is_resolved(&self) -> bool;

    /// Nested wire map of the resolved row.
    fn export_value(&self) -> Result<Option<Value>, EngineError>;

    /// Fetches the referenced row through the engine and attaches it when found.
    async fn resolve(&mut self, engine: &Engine, principal: Option<&Authentication>) -> Result<(), EngineError>;
}

/// Foreign key to a `T` row plus, optionally, the resolved row.
#[derive(Clone, Debug)]
pub struct Relation<T: Table> {
    name: ColumnName,
    ref_name: String,
    flags: ColumnFlags,
    mode: LoadMode,
    key: Option<i64>,
    value: Option<Box<T>>,
}

impl<T: Table> Relation<T> {
    /// DIRECT relation named `<target>_id` / `<target>`.
    pub fn new(flags: ColumnFlags) -> Self {
        Self::with_mode(flags, LoadMode::Direct)
    }

    pub fn with_mode(flags: ColumnFlags, mode: LoadMode) -> Self {
        let target = T::table_name();
        Self::named(flags, mode, &format!("{}_id", target), &target)
    }

    pub fn named(flags: ColumnFlags, mode: LoadMode, key_name: &str, ref_name: &str) -> Self {
        Relation {
            name: ColumnName::new(key_name),
            ref_name: ref_name.to_string(),
            flags,
            mode,
            key: None,
            value: None,
        }
    }

    pub fn key(&self) -> Result<i64, ColumnError> {
        self.key.ok_or_else(|| ColumnError::Null(self.name.get().to_string()))
    }

    pub fn key_value(&self) -> Option<i64> {
        self.key
    }

    pub fn is_key_null(&self) -> bool {
        self.key.is_none()
    }

    pub fn set_key(&mut self, key: Option<i64>) -> Result<(), ColumnError> {
        if key.is_none() && !self.flags.is_nullable() {
            return Err(ColumnError::CannotBeNull(self.name.get().to_string()));
        }
        self.key = key;
        Ok(())
    }

    /// Drops the key and any resolved row, regardless of nullability.
    pub(crate) fn clear(&mut self) {
        self.key = None;
        self.value = None;
    }

    /// Attaches the referenced row and takes its primary key as the foreign key.
    pub fn set_value(&mut self, row: T) -> Result<(), ColumnError> {
        let key = *row.base().primary_key().get()?;
        self.key = Some(key);
        self.value = Some(Box::new(row));
        Ok(())
    }

    pub fn get(&self) -> Result<&T, ColumnError> {
        self.value
            .as_deref()
            .ok_or_else(|| ColumnError::Null(self.ref_name.clone()))
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_deref()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn column_name(&self) -> &str {
        self.name.get()
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }
}

#[async_trait]
impl<T: Table> OneToOneField for Relation<T> {
    fn column_name(&self) -> &str {
        self.name.get()
    }

    fn set_column_name(&self, name: &str) {
        self.name.assign(name)
    }

    fn ref_name(&self) -> &str {
        &self.ref_name
    }

    fn flags(&self) -> ColumnFlags {
        self.flags
    }

    fn mode(&self) -> LoadMode {
        self.mode
    }

    fn target(&self) -> String {
        T::table_name()
    }

    fn key(&self) -> Option<i64> {
        self.key
    }

    fn set_key(&mut self, key: Option<i64>) -> Result<(), ColumnError> {
        Relation::set_key(self, key)
    }

    fn clear_key(&mut self) {
        self.clear()
    }

    fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    fn export_value(&self) -> Result<Option<Value>, EngineError> {
        match &self.value {
            Some(row) => Ok(Some(Value::Object(row.deserialize()?))),
            None => Ok(None),
        }
    }

    async fn resolve(&mut self, engine: &Engine, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let Some(key) = self.key else {
            return Ok(());
        };
        if let Some(row) = engine.select::<T>(principal, key).await? {
            self.set_value(row)?;
        }
        Ok(())
    }
}

impl<T: Table> KeyColumn for Relation<T> {
    fn column_name(&self) -> &str {
        self.name.get()
    }

    fn sql_type(&self) -> &SqlType {
        static KEY_TYPE: SqlType = SqlType::BIGINT;
        &KEY_TYPE
    }

    fn key_value(&self) -> Option<i64> {
        self.key
    }
}

/// Type-erased view of a one-to-many relation.
#[async_trait]
pub trait OneToManyField: Send + Sync {
    fn column_name(&self) -> &str;

    fn set_column_name(&self, name: &str);

    fn mode(&self) -> LoadMode;

    fn target(&self) -> String;

    /// Resolves the foreign-key column on the target type; fails unless it is BIGINT.
    fn ref_column(&self) -> Result<String, ConfigError>;

    fn export_values(&self) -> Result<Vec<Value>, EngineError>;

    /// Materializes the target rows whose foreign key equals `id`.
    async fn load(&mut self, engine: &Engine, id: i64, principal: Option<&Authentication>) -> Result<(), EngineError>;
}

/// Selects the foreign-key column on an instance of the target type.
pub type KeySelector<T> = fn(&T) -> &dyn KeyColumn;

/// Computed, never-persisted view of the `T` rows pointing at this row.
#[derive(Clone)]
pub struct RelationMany<T: Table> {
    name: ColumnName,
    selector: KeySelector<T>,
    mode: LoadMode,
    value: Option<Vec<T>>,
}

impl<T: Table> RelationMany<T> {
    pub fn new(selector: KeySelector<T>) -> Self {
        Self::with_mode(selector, LoadMode::Direct)
    }

    pub fn with_mode(selector: KeySelector<T>, mode: LoadMode) -> Self {
        RelationMany {
            name: ColumnName::default(),
            selector,
            mode,
            value: None,
        }
    }

    pub fn named(selector: KeySelector<T>, mode: LoadMode, name: &str) -> Self {
        RelationMany {
            name: ColumnName::new(name),
            selector,
            mode,
            value: None,
        }
    }

    pub fn get(&self) -> Result<&[T], ColumnError> {
        self.value
            .as_deref()
            .ok_or_else(|| ColumnError::Null(self.name.get().to_string()))
    }

    pub fn value(&self) -> Option<&[T]> {
        self.value.as_deref()
    }

    pub fn set(&mut self, rows: Vec<T>) {
        self.value = Some(rows);
    }

    pub fn column_name(&self) -> &str {
        self.name.get()
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }
}

impl<T: Table> std::fmt::Debug for RelationMany<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationMany")
            .field("name", &self.name.get())
            .field("target", &T::table_name())
            .field("mode", &self.mode)
            .field("loaded", &self.value.as_ref().map(Vec::len))
            .finish()
    }
}

#[async_trait]
impl<T: Table> OneToManyField for RelationMany<T> {
    fn column_name(&self) -> &str {
        self.name.get()
    }

    fn set_column_name(&self, name: &str) {
        self.name.assign(name)
    }

    fn mode(&self) -> LoadMode {
        self.mode
    }

    fn target(&self) -> String {
        T::table_name()
    }

    fn ref_column(&self) -> Result<String, ConfigError> {
        let probe = T::new();
        assign_names(&probe);
        let column = (self.selector)(&probe);
        if column.sql_type().category() != TypeCategory::BigInt {
            return Err(ConfigError::RelationTarget {
                relation: self.name.get().to_string(),
                column: column.column_name().to_string(),
                found: column.sql_type().name().to_string(),
            });
        }
        Ok(column.column_name().to_string())
    }

    fn export_values(&self) -> Result<Vec<Value>, EngineError> {
        let rows = self.value.as_deref().unwrap_or(&[]);
        rows.iter()
            .map(|row| row.deserialize().map(Value::Object))
            .collect()
    }

    async fn load(&mut self, engine: &Engine, id: i64, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let rows = engine.select_all::<T>(principal).await?;
        let matching = rows
            .into_iter()
            .filter(|row| (self.selector)(row).key_value() == Some(id))
            .collect();
        self.value = Some(matching);
        Ok(())
    }
}
