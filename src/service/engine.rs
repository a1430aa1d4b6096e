//! The entity engine. One per application; cheap to clone.

use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::validation::RowValidator;
use crate::bridge::{record_id, Bridge};
use crate::config::Settings;
use crate::error::{ConfigError, EngineError};
use crate::event::{EventArgs, Events};
use crate::openapi::{SchemaRef, SchemaRegistry};
use crate::registry::{Registered, Registry, TableMeta};
use crate::relation::LoadMode;
use crate::routes::RouteTable;
use crate::security::{self, Access, Authentication, Permission};
use crate::table::{FieldMut, LevelOverrides, Record, Table};

struct EngineInner {
    bridge: Arc<dyn Bridge>,
    registry: RwLock<Registry>,
    settings: Settings,
}

/// Registers tables and runs every lifecycle operation against one storage bridge.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Which relations a load pass touches.
#[derive(Clone, Copy)]
struct LoadScope {
    one_to_one: bool,
    one_to_many: bool,
    lazy: bool,
}

impl LoadScope {
    fn includes(self, mode: LoadMode) -> bool {
        mode == LoadMode::Direct || self.lazy
    }
}

fn is_root(principal: Option<&Authentication>) -> bool {
    principal.is_some_and(Authentication::is_superuser)
}

impl Engine {
    /// Engine with default settings; the permission and authentication tables are registered.
    pub fn new(bridge: Arc<dyn Bridge>) -> Result<Self, ConfigError> {
        Self::with_settings(bridge, Settings::default())
    }

    pub fn with_settings(bridge: Arc<dyn Bridge>, settings: Settings) -> Result<Self, ConfigError> {
        let engine = Engine {
            inner: Arc::new(EngineInner {
                bridge,
                registry: RwLock::new(Registry::new()),
                settings,
            }),
        };
        engine.register::<Permission>()?;
        engine.register::<Authentication>()?;
        Ok(engine)
    }

    fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn bridge(&self) -> &Arc<dyn Bridge> {
        &self.inner.bridge
    }

    /// Declares `T` at the root namespace.
    pub fn register<T: Table>(&self) -> Result<Arc<TableMeta>, ConfigError> {
        self.register_in::<T>(None)
    }

    /// Declares `T`, prefixing its full name with `namespace` when given.
    pub fn register_in<T: Table>(&self, namespace: Option<&str>) -> Result<Arc<TableMeta>, ConfigError> {
        let meta = self.registry_mut().register::<T>(namespace)?;
        tracing::info!(
            table = %meta.full_name,
            columns = meta.layout.columns.len(),
            "registered table"
        );
        Ok(meta)
    }

    pub fn meta<T: Table>(&self) -> Result<Arc<TableMeta>, ConfigError> {
        self.registry().meta::<T>()
    }

    /// Lifecycle phases of `T`, for subscribing.
    pub fn events<T: Table>(&self) -> Result<Arc<Events<T>>, ConfigError> {
        self.registry().events::<T>()
    }

    /// Edits the route table of `T` after registration.
    pub fn configure_routes<T: Table, F>(&self, configure: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut RouteTable),
    {
        let routes = self.registry().routes::<T>()?;
        let mut routes = routes.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        configure(&mut routes);
        Ok(())
    }

    /// Registers a named schema definition for documents and custom routes.
    pub fn define_schema(&self, name: &str, schema: Value) -> Result<SchemaRef, ConfigError> {
        self.registry_mut().define_schema(name, schema)
    }

    pub(crate) fn registered(&self) -> Vec<Registered> {
        self.registry().registered()
    }

    pub(crate) fn schemas(&self) -> SchemaRegistry {
        self.registry().schemas().clone()
    }

    /// Typed handle scoped to `T`.
    pub fn table<T: Table>(&self) -> TableHandle<T> {
        TableHandle {
            engine: self.clone(),
            _table: PhantomData,
        }
    }

    /// Loads and attaches the permission record of `row` if it carries a key.
    async fn permission_of<T: Table>(&self, row: &mut T) -> Result<(), EngineError> {
        let Some(key) = row.base().permission().and_then(|p| p.key_value()) else {
            return Ok(());
        };
        if row.base().permission().is_some_and(|p| !p.is_null()) {
            return Ok(());
        }
        let meta = self.meta::<Permission>()?;
        let Some(record) = self.inner.bridge.select_single(&meta, key).await? else {
            return Ok(());
        };
        let mut permission = Permission::new();
        permission.from_record(&record)?;
        if let Some(relation) = row.base_mut().permission_mut() {
            relation.set_value(permission)?;
        }
        Ok(())
    }

    async fn check_access<T: Table>(
        &self,
        access: Access,
        row: &mut T,
        principal: Option<&Authentication>,
    ) -> Result<bool, EngineError> {
        if principal.is_some_and(|p| !access.allowed_for(p)) {
            return Ok(false);
        }
        self.permission_of(row).await?;
        let permission = row.base().permission().and_then(|p| p.value());
        Ok(security::check(access, permission, principal))
    }

    pub async fn check_read_permission<T: Table>(
        &self,
        row: &mut T,
        principal: Option<&Authentication>,
    ) -> Result<bool, EngineError> {
        self.check_access(Access::Read, row, principal).await
    }

    pub async fn check_write_permission<T: Table>(
        &self,
        row: &mut T,
        principal: Option<&Authentication>,
    ) -> Result<bool, EngineError> {
        self.check_access(Access::Write, row, principal).await
    }

    pub async fn check_delete_permission<T: Table>(
        &self,
        row: &mut T,
        principal: Option<&Authentication>,
    ) -> Result<bool, EngineError> {
        self.check_access(Access::Delete, row, principal).await
    }

    /// Root skips the check; everyone else must pass `access` on the row.
    async fn require<T: Table>(
        &self,
        access: Access,
        meta: &TableMeta,
        row: &mut T,
        principal: Option<&Authentication>,
    ) -> Result<(), EngineError> {
        if is_root(principal) || self.check_access(access, row, principal).await? {
            return Ok(());
        }
        tracing::warn!(
            table = %meta.full_name,
            id = ?row.id(),
            principal = ?principal.and_then(Table::id),
            operation = access.verb(),
            "permission denied"
        );
        Err(EngineError::Permission {
            table: meta.full_name.clone(),
            operation: access.verb(),
        })
    }

    /// Persists a new row with a fresh permission record owned by `principal`.
    pub async fn insert<T: Table>(
        &self,
        row: &mut T,
        principal: Option<&Authentication>,
        overrides: LevelOverrides,
    ) -> Result<(), EngineError> {
        let meta = self.meta::<T>()?;
        if row.base().permission().is_none() {
            return Err(EngineError::NotPerformable {
                table: meta.full_name.clone(),
                operation: "insert",
            });
        }
        if !is_root(principal) && !T::check_create_permission(principal) {
            tracing::warn!(
                table = %meta.full_name,
                principal = ?principal.and_then(Table::id),
                "create denied"
            );
            return Err(EngineError::Permission {
                table: meta.full_name.clone(),
                operation: "insert",
            });
        }
        RowValidator::check(self.settings().validation, &meta, row)?;

        let permission_meta = self.meta::<Permission>()?;
        let events = self.events::<T>()?;
        let mut permission = Permission::grant(
            principal.and_then(Table::id),
            overrides.apply(row.base().levels()),
        );

        events.before_insert.emit(EventArgs::Row(Arc::new(row.clone()))).await?;

        let mut record = row.to_record()?;
        let mut permission_record = permission.to_record()?;
        self.inner
            .bridge
            .insert(&meta, &mut record, &permission_meta, &mut permission_record)
            .await?;
        permission.from_record(&permission_record)?;
        let id = record_id(&meta, &record)?;
        row.base_mut().set_id(id);
        if let Some(relation) = row.base_mut().permission_mut() {
            relation.set_value(permission)?;
        }
        tracing::debug!(table = %meta.full_name, id, "inserted row");

        events.after_insert.emit(EventArgs::Row(Arc::new(row.clone()))).await?;
        Ok(())
    }

    /// Writes every stored column of an existing row.
    pub async fn update<T: Table>(&self, row: &mut T, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let meta = self.meta::<T>()?;
        self.require(Access::Write, &meta, row, principal).await?;
        RowValidator::check(self.settings().validation, &meta, row)?;

        let record = row.to_record()?;
        if !self.inner.bridge.row_exist(&meta, &record).await? {
            return Err(EngineError::NotInserted {
                table: meta.full_name.clone(),
                operation: "update",
            });
        }

        let events = self.events::<T>()?;
        events.before_update.emit(EventArgs::Row(Arc::new(row.clone()))).await?;
        self.inner.bridge.update(&meta, &record).await?;
        tracing::debug!(table = %meta.full_name, id = ?row.id(), "updated row");
        events.after_update.emit(EventArgs::Row(Arc::new(row.clone()))).await?;
        Ok(())
    }

    pub async fn delete<T: Table>(&self, row: &mut T, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let meta = self.meta::<T>()?;
        self.require(Access::Delete, &meta, row, principal).await?;

        let record = row.to_record()?;
        if !self.inner.bridge.row_exist(&meta, &record).await? {
            return Err(EngineError::NotInserted {
                table: meta.full_name.clone(),
                operation: "delete",
            });
        }

        let events = self.events::<T>()?;
        events.before_delete.emit(EventArgs::Row(Arc::new(row.clone()))).await?;
        self.inner.bridge.delete(&meta, &record).await?;
        if let Some(key) = row.base().permission().and_then(|p| p.key_value()) {
            let permission_meta = self.meta::<Permission>()?;
            let mut permission_record = Record::new();
            permission_record.insert(permission_meta.primary_key().to_string(), Value::from(key));
            self.inner.bridge.delete(&permission_meta, &permission_record).await?;
        }
        tracing::debug!(table = %meta.full_name, id = ?row.id(), "deleted row");
        events.after_delete.emit(EventArgs::Row(Arc::new(row.clone()))).await?;
        Ok(())
    }

    /// Row `id` if it exists and `principal` may read it.
    pub async fn select<T: Table>(&self, principal: Option<&Authentication>, id: i64) -> Result<Option<T>, EngineError> {
        let meta = self.meta::<T>()?;
        let events = self.events::<T>()?;
        events.before_select.emit(EventArgs::None).await?;

        let Some(record) = self.inner.bridge.select_single(&meta, id).await? else {
            return Ok(None);
        };
        let mut row = T::new();
        row.from_record(&record)?;
        let visible = is_root(principal) || self.check_access(Access::Read, &mut row, principal).await?;
        let row = visible.then_some(row);

        events
            .after_select
            .emit(EventArgs::Rows(Arc::new(vec![row.clone()])))
            .await?;
        Ok(row)
    }

    /// Every row `principal` may read, in storage order.
    pub async fn select_all<T: Table>(&self, principal: Option<&Authentication>) -> Result<Vec<T>, EngineError> {
        let meta = self.meta::<T>()?;
        let events = self.events::<T>()?;
        events.before_select.emit(EventArgs::None).await?;

        let records = self.inner.bridge.select_all(&meta).await?;
        let total = records.len();
        let mut rows = Vec::with_capacity(total);
        for record in &records {
            let mut row = T::new();
            row.from_record(record)?;
            if is_root(principal) || self.check_access(Access::Read, &mut row, principal).await? {
                rows.push(row);
            }
        }
        tracing::debug!(table = %meta.full_name, total, visible = rows.len(), "selected rows");

        let snapshot: Vec<Option<T>> = rows.iter().cloned().map(Some).collect();
        events.after_select.emit(EventArgs::Rows(Arc::new(snapshot))).await?;
        Ok(rows)
    }

    /// Attaches every DIRECT one-to-one target the principal may read.
    pub async fn resolve<T: Table>(&self, row: &mut T, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let scope = LoadScope {
            one_to_one: true,
            one_to_many: false,
            lazy: false,
        };
        self.load_relations(row, principal, scope).await
    }

    /// Materializes every DIRECT one-to-many relation.
    pub async fn resolve_many<T: Table>(&self, row: &mut T, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let scope = LoadScope {
            one_to_one: false,
            one_to_many: true,
            lazy: false,
        };
        self.load_relations(row, principal, scope).await
    }

    /// Loads every declared relation, LAZY ones included.
    pub async fn load<T: Table>(&self, row: &mut T, principal: Option<&Authentication>) -> Result<(), EngineError> {
        let scope = LoadScope {
            one_to_one: true,
            one_to_many: true,
            lazy: true,
        };
        self.load_relations(row, principal, scope).await
    }

    async fn load_relations<T: Table>(
        &self,
        row: &mut T,
        principal: Option<&Authentication>,
        scope: LoadScope,
    ) -> Result<(), EngineError> {
        row.columns()?;
        let id = row.id();
        let (_, fields) = row.fields_mut();
        for (_, field) in fields {
            match field {
                FieldMut::OneToOne(relation) if scope.one_to_one && scope.includes(relation.mode()) => {
                    relation.resolve(self, principal).await?;
                }
                FieldMut::OneToMany(relation) if scope.one_to_many && scope.includes(relation.mode()) => {
                    if let Some(id) = id {
                        relation.load(self, id, principal).await?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Engine view scoped to one table type.
pub struct TableHandle<T> {
    engine: Engine,
    _table: PhantomData<fn() -> T>,
}

impl<T> Clone for TableHandle<T> {
    fn clone(&self) -> Self {
        TableHandle {
            engine: self.engine.clone(),
            _table: PhantomData,
        }
    }
}

impl<T: Table> TableHandle<T> {
    pub fn meta(&self) -> Result<Arc<TableMeta>, ConfigError> {
        self.engine.meta::<T>()
    }

    pub fn events(&self) -> Result<Arc<Events<T>>, ConfigError> {
        self.engine.events::<T>()
    }

    pub async fn select(&self, principal: Option<&Authentication>, id: i64) -> Result<Option<T>, EngineError> {
        self.engine.select::<T>(principal, id).await
    }

    pub async fn select_all(&self, principal: Option<&Authentication>) -> Result<Vec<T>, EngineError> {
        self.engine.select_all::<T>(principal).await
    }
}
