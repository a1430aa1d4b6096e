//! PostgreSQL bridge over pre-existing tables.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use super::{record_id, Bridge};
use crate::error::BridgeError;
use crate::registry::TableMeta;
use crate::sql::{self, cell_to_value, PgBindValue, QueryBuf};
use crate::table::Record;

#[derive(Clone)]
pub struct PgBridge {
    pool: PgPool,
    schema: Option<String>,
}

impl PgBridge {
    pub fn new(pool: PgPool) -> Self {
        PgBridge { pool, schema: None }
    }

    /// Qualify every table with `schema`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

fn bind(q: &QueryBuf) -> Result<Query<'_, Postgres, PgArguments>, BridgeError> {
    tracing::debug!(sql = %q.sql, params = ?q.params.iter().map(|p| &p.value).collect::<Vec<_>>(), "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_cell(&p.value, p.category)?);
    }
    Ok(query)
}

fn row_to_record(table: &TableMeta, row: &PgRow) -> Result<Record, BridgeError> {
    let mut record = Record::new();
    for c in table.layout.stored() {
        let value = cell_to_value(row, &c.name, c.sql_type.category())?;
        record.insert(c.name.clone(), value);
    }
    Ok(record)
}

fn returned_id(table: &TableMeta, row: &PgRow) -> Result<i64, BridgeError> {
    Ok(row.try_get::<i64, _>(table.primary_key())?)
}

#[async_trait]
impl Bridge for PgBridge {
    async fn select_single(&self, table: &TableMeta, id: i64) -> Result<Option<Record>, BridgeError> {
        let q = sql::select_by_id(table, self.schema(), id);
        let row = bind(&q)?.fetch_optional(&self.pool).await?;
        row.map(|r| row_to_record(table, &r)).transpose()
    }

    async fn select_all(&self, table: &TableMeta) -> Result<Vec<Record>, BridgeError> {
        let q = sql::select_all(table, self.schema());
        let rows = bind(&q)?.fetch_all(&self.pool).await?;
        rows.iter().map(|r| row_to_record(table, r)).collect()
    }

    async fn insert(
        &self,
        table: &TableMeta,
        row: &mut Record,
        permission_table: &TableMeta,
        permission: &mut Record,
    ) -> Result<(), BridgeError> {
        let mut tx = self.pool.begin().await?;

        let q = sql::insert(permission_table, self.schema(), permission);
        let inserted = bind(&q)?.fetch_one(&mut *tx).await?;
        let permission_id = returned_id(permission_table, &inserted)?;
        permission.insert(permission_table.primary_key().to_string(), Value::from(permission_id));
        if let Some(column) = table.permission_column() {
            row.insert(column.to_string(), Value::from(permission_id));
        }

        let q = sql::insert(table, self.schema(), row);
        let inserted = bind(&q)?.fetch_one(&mut *tx).await?;
        let id = returned_id(table, &inserted)?;
        row.insert(table.primary_key().to_string(), Value::from(id));

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, table: &TableMeta, row: &Record) -> Result<(), BridgeError> {
        let id = record_id(table, row)?;
        let Some(q) = sql::update(table, self.schema(), id, row) else {
            return Ok(());
        };
        bind(&q)?.execute(&self.pool).await?;
        Ok(())
    }

    async fn delete(&self, table: &TableMeta, row: &Record) -> Result<(), BridgeError> {
        let id = record_id(table, row)?;
        let q = sql::delete(table, self.schema(), id);
        bind(&q)?.execute(&self.pool).await?;
        Ok(())
    }

    async fn row_exist(&self, table: &TableMeta, row: &Record) -> Result<bool, BridgeError> {
        let Ok(id) = record_id(table, row) else {
            return Ok(false);
        };
        let q = sql::exists(table, self.schema(), id);
        Ok(bind(&q)?.fetch_optional(&self.pool).await?.is_some())
    }
}
