//! Per-engine table registry: metadata, event pipelines, route tables and schema definitions.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use axum::Router;
use serde_json::Value;

use crate::case::to_sql_friendly;
use crate::error::ConfigError;
use crate::event::Events;
use crate::openapi::{SchemaRef, SchemaRegistry};
use crate::routes::{mount, RouteTable};
use crate::state::AppState;
use crate::table::{Layout, Levels, Table};

/// Registration-time description of a table.
#[derive(Clone, Debug)]
pub struct TableMeta {
    pub type_name: &'static str,
    pub table_name: String,
    pub namespace: Option<String>,
    pub full_name: String,
    pub levels: Levels,
    pub layout: Arc<Layout>,
}

impl TableMeta {
    /// Discovers `T` on a fresh instance.
    pub fn of<T: Table>(namespace: Option<&str>) -> Result<Self, ConfigError> {
        let probe = T::new();
        let layout = probe.columns()?;
        let table_name = T::table_name();
        let namespace = namespace.map(to_sql_friendly).filter(|ns| !ns.is_empty());
        let full_name = match &namespace {
            Some(ns) => format!("{}_{}", ns, table_name),
            None => table_name.clone(),
        };
        Ok(TableMeta {
            type_name: T::NAME,
            table_name,
            namespace,
            full_name,
            levels: probe.base().levels(),
            layout,
        })
    }

    pub fn primary_key(&self) -> &str {
        &self.layout.primary_key
    }

    pub fn permission_column(&self) -> Option<&str> {
        self.layout.permission.as_deref()
    }
}

pub(crate) type MountFn = fn(Router<AppState>, &TableMeta, &RouteTable) -> Router<AppState>;

struct Entry {
    meta: Arc<TableMeta>,
    events: Arc<dyn Any + Send + Sync>,
    routes: Arc<RwLock<RouteTable>>,
    mount: MountFn,
}

/// Snapshot of one registered table, for router and document assembly.
pub(crate) struct Registered {
    pub meta: Arc<TableMeta>,
    pub routes: RouteTable,
    pub mount: MountFn,
}

pub(crate) struct Registry {
    entries: HashMap<TypeId, Entry>,
    order: Vec<TypeId>,
    names: HashSet<String>,
    schemas: SchemaRegistry,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            entries: HashMap::new(),
            order: Vec::new(),
            names: HashSet::new(),
            schemas: SchemaRegistry::new(),
        }
    }

    pub(crate) fn register<T: Table>(&mut self, namespace: Option<&str>) -> Result<Arc<TableMeta>, ConfigError> {
        let meta = TableMeta::of::<T>(namespace)?;
        if self.entries.contains_key(&TypeId::of::<T>()) || self.names.contains(&meta.full_name) {
            return Err(ConfigError::DuplicateTable(meta.full_name));
        }

        let mut routes = RouteTable::default();
        T::configure_routes(&mut routes);

        let meta = Arc::new(meta);
        self.names.insert(meta.full_name.clone());
        self.order.push(TypeId::of::<T>());
        self.entries.insert(
            TypeId::of::<T>(),
            Entry {
                meta: Arc::clone(&meta),
                events: Arc::new(Events::<T>::default()),
                routes: Arc::new(RwLock::new(routes)),
                mount: mount::<T>,
            },
        );
        Ok(meta)
    }

    fn entry<T: Table>(&self) -> Result<&Entry, ConfigError> {
        self.entries
            .get(&TypeId::of::<T>())
            .ok_or(ConfigError::NotRegistered(T::NAME))
    }

    pub(crate) fn meta<T: Table>(&self) -> Result<Arc<TableMeta>, ConfigError> {
        self.entry::<T>().map(|e| Arc::clone(&e.meta))
    }

    pub(crate) fn events<T: Table>(&self) -> Result<Arc<Events<T>>, ConfigError> {
        let entry = self.entry::<T>()?;
        Arc::clone(&entry.events)
            .downcast::<Events<T>>()
            .map_err(|_| ConfigError::NotRegistered(T::NAME))
    }

    pub(crate) fn routes<T: Table>(&self) -> Result<Arc<RwLock<RouteTable>>, ConfigError> {
        self.entry::<T>().map(|e| Arc::clone(&e.routes))
    }

    /// Registered tables in registration order.
    pub(crate) fn registered(&self) -> Vec<Registered> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| Registered {
                meta: Arc::clone(&e.meta),
                routes: e
                    .routes
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone(),
                mount: e.mount,
            })
            .collect()
    }

    pub(crate) fn define_schema(&mut self, name: &str, schema: Value) -> Result<SchemaRef, ConfigError> {
        self.schemas.define(name, schema)
    }

    pub(crate) fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }
}
