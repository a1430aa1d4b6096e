//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a table's column layout.

use serde_json::Value;

use crate::registry::TableMeta;
use crate::table::{ColumnInfo, Record};
use crate::types::TypeCategory;

/// Quote identifier for PostgreSQL (safe: only from declarations).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(table)),
        None => quoted(table),
    }
}

/// Postgres type a placeholder is cast to.
pub fn pg_type(category: TypeCategory) -> &'static str {
    match category {
        TypeCategory::TinyInt | TypeCategory::SmallInt => "smallint",
        TypeCategory::MediumInt | TypeCategory::Int => "integer",
        TypeCategory::BigInt => "bigint",
        TypeCategory::Bool => "boolean",
        TypeCategory::Float => "real",
        TypeCategory::Double => "double precision",
        TypeCategory::VarChar => "varchar",
        TypeCategory::Text => "text",
        TypeCategory::Date => "date",
        TypeCategory::Time => "time",
        TypeCategory::DateTime => "timestamp",
        TypeCategory::Blob => "bytea",
    }
}

/// A bound value and the column type it is destined for.
#[derive(Clone, Debug)]
pub struct Param {
    pub value: Value,
    pub category: TypeCategory,
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Param>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Pushes a parameter and returns its cast placeholder.
    fn push_param(&mut self, value: Value, category: TypeCategory) -> String {
        self.params.push(Param { value, category });
        format!("${}::{}", self.params.len(), pg_type(category))
    }
}

fn stored_columns(meta: &TableMeta) -> impl Iterator<Item = &ColumnInfo> {
    meta.layout.stored()
}

fn column_list(meta: &TableMeta) -> String {
    stored_columns(meta)
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT by primary key. Caller binds the id as sole param.
pub fn select_by_id(meta: &TableMeta, schema: Option<&str>, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &meta.full_name);
    let ph = q.push_param(Value::from(id), TypeCategory::BigInt);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        column_list(meta),
        table,
        quoted(meta.primary_key()),
        ph
    );
    q
}

/// SELECT every row, ORDER BY primary key.
pub fn select_all(meta: &TableMeta, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &meta.full_name);
    q.sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        column_list(meta),
        table,
        quoted(meta.primary_key())
    );
    q
}

/// INSERT every stored column except the primary key, RETURNING the assigned key.
pub fn insert(meta: &TableMeta, schema: Option<&str>, row: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &meta.full_name);
    let pk = meta.primary_key();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in stored_columns(meta) {
        if c.name == pk {
            continue;
        }
        let value = row.get(&c.name).cloned().unwrap_or(Value::Null);
        placeholders.push(q.push_param(value, c.sql_type.category()));
        cols.push(quoted(&c.name));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, quoted(pk))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            quoted(pk)
        )
    };
    q
}

/// UPDATE by primary key: SET every stored column present in the record.
pub fn update(meta: &TableMeta, schema: Option<&str>, id: i64, row: &Record) -> Option<QueryBuf> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &meta.full_name);
    let pk = meta.primary_key();
    let mut sets = Vec::new();
    for c in stored_columns(meta) {
        if c.name == pk {
            continue;
        }
        let Some(value) = row.get(&c.name) else { continue };
        let rhs = q.push_param(value.clone(), c.sql_type.category());
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    if sets.is_empty() {
        return None;
    }
    let id_ph = q.push_param(Value::from(id), TypeCategory::BigInt);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        sets.join(", "),
        quoted(pk),
        id_ph
    );
    Some(q)
}

/// DELETE by primary key.
pub fn delete(meta: &TableMeta, schema: Option<&str>, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &meta.full_name);
    let ph = q.push_param(Value::from(id), TypeCategory::BigInt);
    q.sql = format!("DELETE FROM {} WHERE {} = {}", table, quoted(meta.primary_key()), ph);
    q
}

/// Existence probe by primary key.
pub fn exists(meta: &TableMeta, schema: Option<&str>, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &meta.full_name);
    let ph = q.push_param(Value::from(id), TypeCategory::BigInt);
    q.sql = format!("SELECT 1 FROM {} WHERE {} = {}", table, quoted(meta.primary_key()), ph);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TableMeta;
    use crate::table::fixtures::Post;
    use serde_json::json;

    fn post_meta() -> TableMeta {
        TableMeta::of::<Post>(None).unwrap()
    }

    #[test]
    fn select_lists_stored_columns_in_layout_order() {
        let q = select_by_id(&post_meta(), Some("app"), 4);
        assert_eq!(
            q.sql,
            "SELECT \"post_id\", \"permission_id\", \"title\", \"secret\", \"author_id\" FROM \"app\".\"post\" WHERE \"post_id\" = $1::bigint"
        );
        assert_eq!(q.params[0].value, json!(4));
    }

    #[test]
    fn insert_skips_primary_key_and_casts_placeholders() {
        let mut row = Record::new();
        row.insert("post_id".into(), json!(9));
        row.insert("permission_id".into(), json!(3));
        row.insert("title".into(), json!("hi"));
        let q = insert(&post_meta(), None, &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"post\" (\"permission_id\", \"title\", \"secret\", \"author_id\") VALUES ($1::bigint, $2::varchar, $3::text, $4::bigint) RETURNING \"post_id\""
        );
        assert_eq!(q.params.len(), 4);
        assert_eq!(q.params[2].value, Value::Null);
    }

    #[test]
    fn update_sets_present_columns_only() {
        let mut row = Record::new();
        row.insert("title".into(), json!("new"));
        let q = update(&post_meta(), None, 5, &row).unwrap();
        assert_eq!(q.sql, "UPDATE \"post\" SET \"title\" = $1::varchar WHERE \"post_id\" = $2::bigint");
        assert!(update(&post_meta(), None, 5, &Record::new()).is_none());
    }
}
