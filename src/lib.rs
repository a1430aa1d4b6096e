//! Tabula SDK: declarative tables with row-level permissions, lifecycle events and generated REST routes.

pub mod bridge;
pub mod case;
pub mod column;
pub mod config;
pub mod error;
pub mod event;
pub mod extractors;
pub mod handlers;
pub mod openapi;
pub mod registry;
pub mod relation;
pub mod response;
pub mod routes;
pub mod security;
pub mod service;
pub mod sql;
pub mod state;
pub mod table;
pub mod telemetry;
pub mod types;

pub use bridge::{Bridge, MemoryBridge, PgBridge};
pub use column::{Column, ColumnFlags};
pub use config::{Settings, ValidationPolicy};
pub use error::{AppError, ConfigError, EngineError};
pub use event::{EventArgs, Events};
pub use extractors::{Authenticator, Principal, StaticTokens};
pub use openapi::{openapi_document, SchemaKind, SchemaRef};
pub use registry::TableMeta;
pub use relation::{LoadMode, Relation, RelationMany};
pub use response::{success_many, success_one, success_one_ok};
pub use routes::{table_routes, OperationSchema, RouteTable};
pub use security::{Authentication, Permission, PermissionLevel};
pub use service::{Engine, TableHandle};
pub use state::AppState;
pub use table::{LevelOverrides, Levels, Table, TableBase};
pub use telemetry::init_tracing;
pub use types::SqlType;
