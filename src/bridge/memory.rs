//! In-process bridge: one ordered map per table, auto-incrementing keys.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{record_id, Bridge};
use crate::error::BridgeError;
use crate::registry::TableMeta;
use crate::table::Record;

#[derive(Default)]
struct MemoryTable {
    last_id: i64,
    rows: BTreeMap<i64, Record>,
}

impl MemoryTable {
    fn store(&mut self, pk: &str, row: &mut Record) -> i64 {
        self.last_id += 1;
        let id = self.last_id;
        row.insert(pk.to_string(), Value::from(id));
        self.rows.insert(id, row.clone());
        id
    }
}

#[derive(Default)]
pub struct MemoryBridge {
    tables: RwLock<HashMap<String, MemoryTable>>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `row` under the id it already carries, bypassing permission creation.
    /// Used to seed principals and fixtures.
    pub async fn put(&self, table: &TableMeta, row: Record) -> Result<(), BridgeError> {
        let id = record_id(table, &row)?;
        let mut tables = self.tables.write().await;
        let entry = tables.entry(table.full_name.clone()).or_default();
        entry.last_id = entry.last_id.max(id);
        entry.rows.insert(id, row);
        Ok(())
    }

    pub async fn len(&self, table: &TableMeta) -> usize {
        self.tables
            .read()
            .await
            .get(&table.full_name)
            .map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl Bridge for MemoryBridge {
    async fn select_single(&self, table: &TableMeta, id: i64) -> Result<Option<Record>, BridgeError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&table.full_name).and_then(|t| t.rows.get(&id)).cloned())
    }

    async fn select_all(&self, table: &TableMeta) -> Result<Vec<Record>, BridgeError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.full_name)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        table: &TableMeta,
        row: &mut Record,
        permission_table: &TableMeta,
        permission: &mut Record,
    ) -> Result<(), BridgeError> {
        let mut tables = self.tables.write().await;
        let permission_id = tables
            .entry(permission_table.full_name.clone())
            .or_default()
            .store(permission_table.primary_key(), permission);
        if let Some(column) = table.permission_column() {
            row.insert(column.to_string(), Value::from(permission_id));
        }
        let id = tables
            .entry(table.full_name.clone())
            .or_default()
            .store(table.primary_key(), row);
        tracing::debug!(table = %table.full_name, id, permission_id, "memory insert");
        Ok(())
    }

    async fn update(&self, table: &TableMeta, row: &Record) -> Result<(), BridgeError> {
        let id = record_id(table, row)?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .get_mut(&table.full_name)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| BridgeError::Backend(format!("no '{}' row with id {}", table.full_name, id)))?;
        for (k, v) in row {
            stored.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn delete(&self, table: &TableMeta, row: &Record) -> Result<(), BridgeError> {
        let id = record_id(table, row)?;
        let mut tables = self.tables.write().await;
        if let Some(t) = tables.get_mut(&table.full_name) {
            t.rows.remove(&id);
        }
        Ok(())
    }

    async fn row_exist(&self, table: &TableMeta, row: &Record) -> Result<bool, BridgeError> {
        let Some(id) = row.get(table.primary_key()).and_then(Value::as_i64) else {
            return Ok(false);
        };
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.full_name)
            .is_some_and(|t| t.rows.contains_key(&id)))
    }
}
