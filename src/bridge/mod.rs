//! Storage bridge: the narrow interface the engine persists rows through.

mod memory;
mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BridgeError;
use crate::registry::TableMeta;
use crate::table::Record;

pub use memory::MemoryBridge;
pub use postgres::PgBridge;

/// Records are flat maps in storage representation: every stored column, relation keys only.
#[async_trait]
pub trait Bridge: Send + Sync {
    async fn select_single(&self, table: &TableMeta, id: i64) -> Result<Option<Record>, BridgeError>;

    /// Every row, in storage order.
    async fn select_all(&self, table: &TableMeta) -> Result<Vec<Record>, BridgeError>;

    /// Stores `permission` first, writes its key into the row's permission column, then stores
    /// the row. Both assigned primary keys are written back into the passed records.
    async fn insert(
        &self,
        table: &TableMeta,
        row: &mut Record,
        permission_table: &TableMeta,
        permission: &mut Record,
    ) -> Result<(), BridgeError>;

    async fn update(&self, table: &TableMeta, row: &Record) -> Result<(), BridgeError>;

    /// Removes the row keyed by `row`'s primary key from `table` only. The engine deletes the
    /// linked permission record with a second call.
    async fn delete(&self, table: &TableMeta, row: &Record) -> Result<(), BridgeError>;

    async fn row_exist(&self, table: &TableMeta, row: &Record) -> Result<bool, BridgeError>;
}

/// Primary key of `row`, required by update/delete/exist.
pub fn record_id(table: &TableMeta, row: &Record) -> Result<i64, BridgeError> {
    row.get(table.primary_key())
        .and_then(Value::as_i64)
        .ok_or_else(|| BridgeError::MissingKey {
            table: table.full_name.clone(),
            column: table.primary_key().to_string(),
        })
}
