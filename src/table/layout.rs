//! Field discovery and the cached column layout.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::{Field, Table};
use crate::case::to_sql_friendly;
use crate::column::ColumnFlags;
use crate::error::ConfigError;
use crate::relation::LoadMode;
use crate::types::SqlType;

/// How a column relates to other tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnShape {
    Scalar,
    OneToOne {
        ref_name: String,
        target: String,
        mode: LoadMode,
    },
    OneToMany {
        target: String,
        ref_column: String,
        mode: LoadMode,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: SqlType,
    pub flags: ColumnFlags,
    pub shape: ColumnShape,
}

impl ColumnInfo {
    /// One-to-many views are computed, never persisted.
    pub fn is_stored(&self) -> bool {
        !matches!(self.shape, ColumnShape::OneToMany { .. })
    }

    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }
}

/// Ordered columns of a table: primary key, permission link, then declared fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub table: String,
    pub primary_key: String,
    pub permission: Option<String>,
    pub columns: Vec<ColumnInfo>,
}

impl Layout {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn stored(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.is_stored())
    }

    /// Declared columns, without the primary key and the permission link.
    pub fn declared(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| c.name != self.primary_key && Some(&c.name) != self.permission.as_ref())
    }
}

/// Names unnamed declared fields after their identifiers. Idempotent.
pub(crate) fn assign_names<T: Table>(row: &T) {
    for (ident, field) in row.fields() {
        if field.column_name().trim().is_empty() {
            field.set_column_name(&to_sql_friendly(ident));
        }
    }
}

fn claim(seen: &mut HashSet<String>, name: &str) -> Result<(), ConfigError> {
    if !seen.insert(name.to_string()) {
        return Err(ConfigError::DuplicateColumn(name.to_string()));
    }
    Ok(())
}

fn describe(field: &Field<'_>) -> Result<ColumnInfo, ConfigError> {
    Ok(match field {
        Field::Scalar(c) => ColumnInfo {
            name: c.column_name().to_string(),
            sql_type: c.sql_type().clone(),
            flags: c.flags(),
            shape: ColumnShape::Scalar,
        },
        Field::OneToOne(r) => ColumnInfo {
            name: r.column_name().to_string(),
            sql_type: SqlType::BIGINT,
            flags: r.flags(),
            shape: ColumnShape::OneToOne {
                ref_name: r.ref_name().to_string(),
                target: r.target(),
                mode: r.mode(),
            },
        },
        Field::OneToMany(r) => ColumnInfo {
            name: r.column_name().to_string(),
            sql_type: SqlType::BIGINT,
            flags: ColumnFlags::READONLY,
            shape: ColumnShape::OneToMany {
                target: r.target(),
                ref_column: r.ref_column()?,
                mode: r.mode(),
            },
        },
    })
}

pub(super) fn discover<T: Table>(row: &T) -> Result<Arc<Layout>, ConfigError> {
    let base = row.base();
    if let Some(layout) = base.layout.get() {
        return Ok(Arc::clone(layout));
    }

    assign_names(row);
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    let declared = row.fields();
    for field in base.fields().iter().chain(declared.iter().map(|(_, f)| f)) {
        let info = describe(field)?;
        claim(&mut seen, &info.name)?;
        if let ColumnShape::OneToOne { ref_name, .. } = &info.shape {
            claim(&mut seen, ref_name)?;
        }
        columns.push(info);
    }

    let layout = Arc::new(Layout {
        table: T::table_name(),
        primary_key: base.primary_key.column_name().to_string(),
        permission: base.permission.as_ref().map(|p| p.column_name().to_string()),
        columns,
    });
    tracing::trace!(table = %layout.table, columns = layout.columns.len(), "discovered columns");
    Ok(Arc::clone(base.layout.get_or_init(|| layout)))
}
