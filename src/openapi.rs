//! OpenAPI 3.1 document assembly from registered tables, route tables and named schemas.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::case::to_camel_case;
use crate::error::ConfigError;
use crate::registry::TableMeta;
use crate::relation::LoadMode;
use crate::routes::{OperationSchema, RouteTable};
use crate::service::Engine;
use crate::table::{ColumnInfo, ColumnShape};
use crate::types::SqlType;

pub const DEFAULT_ERROR: &str = "DEFAULT_ERROR";

/// Reference to a named component schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaRef {
    name: String,
}

/// Generated per-table schema variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Select,
    Create,
    Update,
}

impl SchemaKind {
    fn suffix(self) -> &'static str {
        match self {
            SchemaKind::Select => "select",
            SchemaKind::Create => "create",
            SchemaKind::Update => "update",
        }
    }
}

impl SchemaRef {
    /// Reference by name, without checking that a definition exists.
    pub fn named(name: impl Into<String>) -> Self {
        SchemaRef { name: name.into() }
    }

    /// `<full_name>_<kind>`, generated for every registered table.
    pub fn of(table: &TableMeta, kind: SchemaKind) -> Self {
        Self::named(format!("{}_{}", table.full_name, kind.suffix()))
    }

    pub fn default_error() -> Self {
        Self::named(DEFAULT_ERROR)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> String {
        format!("#/components/schemas/{}", self.name)
    }

    pub(crate) fn to_value(&self) -> Value {
        json!({ "$ref": self.location() })
    }
}

/// Named schema definitions, each defined at most once.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    definitions: Map<String, Value>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let mut definitions = Map::new();
        definitions.insert(
            DEFAULT_ERROR.to_string(),
            json!({
                "type": "object",
                "properties": {
                    "error": {
                        "type": "object",
                        "properties": {
                            "code": { "type": "string" },
                            "message": { "type": "string" },
                            "details": {}
                        },
                        "required": ["code", "message"]
                    }
                }
            }),
        );
        SchemaRegistry { definitions }
    }

    pub fn define(&mut self, name: &str, schema: Value) -> Result<SchemaRef, ConfigError> {
        if self.definitions.contains_key(name) {
            return Err(ConfigError::DuplicateSchema(name.to_string()));
        }
        self.definitions.insert(name.to_string(), schema);
        Ok(SchemaRef::named(name))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> &Map<String, Value> {
        &self.definitions
    }
}

/// `:id` -> `{id}`.
fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(param) => format!("{{{}}}", param),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn scalar_schema(column: &ColumnInfo) -> Value {
    let json_type = column.sql_type.json_type();
    let mut schema = Map::new();
    if column.flags.is_nullable() {
        schema.insert("type".into(), json!([json_type, "null"]));
    } else {
        schema.insert("type".into(), json!(json_type));
    }
    if let Some(format) = column.sql_type.json_format() {
        schema.insert("format".into(), json!(format));
    }
    if let Some(size) = column.sql_type.size() {
        schema.insert("maxLength".into(), json!(size));
    }
    Value::Object(schema)
}

/// Registered tables by table name, for relation references.
type Targets = HashMap<String, TableMeta>;

fn select_schema(meta: &TableMeta, targets: &Targets) -> Value {
    let mut properties = Map::new();
    for column in meta.layout.columns.iter().filter(|c| !c.is_private()) {
        match &column.shape {
            ColumnShape::Scalar => {
                properties.insert(column.name.clone(), scalar_schema(column));
            }
            ColumnShape::OneToOne { ref_name, target, mode } => {
                properties.insert(column.name.clone(), scalar_schema(column));
                if *mode == LoadMode::Direct {
                    if let Some(target) = targets.get(target) {
                        properties.insert(ref_name.clone(), SchemaRef::of(target, SchemaKind::Select).to_value());
                    }
                }
            }
            ColumnShape::OneToMany { target, .. } => {
                let items = match targets.get(target) {
                    Some(target) => SchemaRef::of(target, SchemaKind::Select).to_value(),
                    None => json!({ "type": "object" }),
                };
                properties.insert(column.name.clone(), json!({ "type": "array", "items": items }));
            }
        }
    }
    json!({ "type": "object", "properties": properties })
}

fn input_schema(meta: &TableMeta, require: bool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let writable = meta
        .layout
        .declared()
        .filter(|c| c.is_stored() && !c.flags.is_protected());
    for column in writable {
        properties.insert(column.name.clone(), scalar_schema(column));
        if require && !column.flags.is_nullable() {
            required.push(Value::String(column.name.clone()));
        }
    }
    let mut schema = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}

fn default_operations(meta: &TableMeta, routes: &RouteTable) -> Vec<(&'static str, String, OperationSchema)> {
    let base = format!("/{}", meta.full_name);
    let single = format!("{}/:id", base);
    let select = SchemaRef::of(meta, SchemaKind::Select);
    let mut out = Vec::new();
    if routes.get_all {
        out.push((
            "get",
            base.clone(),
            OperationSchema::new(format!("List readable {} rows", meta.full_name)).response(200, select.clone()),
        ));
    }
    if routes.create {
        out.push((
            "post",
            base.clone(),
            OperationSchema::new(format!("Create a {} row", meta.full_name))
                .query("read", SqlType::TINYINT, false)
                .query("write", SqlType::TINYINT, false)
                .query("delete", SqlType::TINYINT, false)
                .body(SchemaRef::of(meta, SchemaKind::Create))
                .response(201, select.clone()),
        ));
    }
    if routes.get_single {
        out.push((
            "get",
            single.clone(),
            OperationSchema::new(format!("Read one {} row", meta.full_name))
                .path("id", SqlType::BIGINT)
                .response(200, select.clone()),
        ));
    }
    if routes.update {
        out.push((
            "put",
            single.clone(),
            OperationSchema::new(format!("Update a {} row", meta.full_name))
                .path("id", SqlType::BIGINT)
                .body(SchemaRef::of(meta, SchemaKind::Update))
                .response(200, select.clone()),
        ));
    }
    if routes.delete {
        out.push((
            "delete",
            single,
            OperationSchema::new(format!("Delete a {} row", meta.full_name)).path("id", SqlType::BIGINT),
        ));
    }
    out
}

/// Assembles the document for every registered table with at least one route.
pub fn openapi_document(engine: &Engine, title: &str, version: &str) -> Value {
    let registered = engine.registered();
    let targets: Targets = registered
        .iter()
        .map(|r| (r.meta.table_name.clone(), (*r.meta).clone()))
        .collect();
    let prefix = engine.settings().api_prefix.clone();

    let mut schemas = engine.schemas().definitions().clone();
    let mut paths = Map::new();
    let mut tags = Vec::new();

    for table in &registered {
        let meta = &table.meta;
        schemas.insert(SchemaRef::of(meta, SchemaKind::Select).name().to_string(), select_schema(meta, &targets));
        schemas.insert(SchemaRef::of(meta, SchemaKind::Create).name().to_string(), input_schema(meta, true));
        schemas.insert(SchemaRef::of(meta, SchemaKind::Update).name().to_string(), input_schema(meta, false));

        let tag = to_camel_case(&meta.full_name);
        let mut operations = default_operations(meta, &table.routes);
        for custom in table.routes.custom() {
            operations.push((
                custom.method_name(),
                format!("/{}{}", meta.full_name, custom.path),
                custom.schema.clone(),
            ));
        }
        if operations.is_empty() {
            continue;
        }
        tags.push(json!({ "name": tag }));
        for (method, path, schema) in operations {
            let item = paths
                .entry(format!("{}{}", prefix, openapi_path(&path)))
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(item) = item {
                item.insert(method.to_string(), schema.to_operation(&tag));
            }
        }
    }

    json!({
        "openapi": "3.1.0",
        "info": { "title": title, "version": version },
        "tags": tags,
        "paths": paths,
        "components": { "schemas": schemas }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_unique() {
        let mut registry = SchemaRegistry::new();
        let reference = registry.define("Count", json!({ "type": "integer" })).unwrap();
        assert_eq!(reference.location(), "#/components/schemas/Count");
        assert_eq!(
            registry.define("Count", json!({})),
            Err(ConfigError::DuplicateSchema("Count".into()))
        );
        assert!(matches!(
            registry.define(DEFAULT_ERROR, json!({})),
            Err(ConfigError::DuplicateSchema(_))
        ));
    }

    #[test]
    fn path_parameters_use_braces() {
        assert_eq!(openapi_path("/post/:id"), "/post/{id}");
        assert_eq!(openapi_path("/post/:id/tags/:tag"), "/post/{id}/tags/{tag}");
        assert_eq!(openapi_path("/post"), "/post");
    }
}
