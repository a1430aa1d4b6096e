//! Per-table route configuration: default route switches, custom routes and their documentation.

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{self, MethodRouter};
use serde_json::{json, Map, Value};

use crate::openapi::SchemaRef;
use crate::state::AppState;
use crate::types::SqlType;

/// Where a documented parameter is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamLocation {
    Query,
    Path,
}

impl ParamLocation {
    fn as_str(self) -> &'static str {
        match self {
            ParamLocation::Query => "query",
            ParamLocation::Path => "path",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub sql_type: SqlType,
    pub required: bool,
}

/// Documented body content: a named schema or raw bytes.
#[derive(Clone, Debug)]
pub enum Payload {
    Schema { schema: SchemaRef, content_type: String },
    Binary { content_type: String },
}

impl Payload {
    fn json(schema: SchemaRef) -> Self {
        Payload::Schema {
            schema,
            content_type: "application/json".to_string(),
        }
    }

    fn content(&self) -> Value {
        let (content_type, schema) = match self {
            Payload::Schema { schema, content_type } => (content_type, schema.to_value()),
            Payload::Binary { content_type } => (content_type, json!({ "type": "string", "format": "binary" })),
        };
        let mut content = Map::new();
        content.insert(content_type.clone(), json!({ "schema": schema }));
        Value::Object(content)
    }
}

/// Documentation of one operation. The `default` response is always the error envelope.
#[derive(Clone, Debug)]
pub struct OperationSchema {
    summary: String,
    parameters: Vec<Parameter>,
    request_body: Option<Payload>,
    responses: Vec<(String, Payload)>,
}

impl OperationSchema {
    pub fn new(summary: impl Into<String>) -> Self {
        OperationSchema {
            summary: summary.into(),
            parameters: Vec::new(),
            request_body: None,
            responses: vec![("default".to_string(), Payload::json(SchemaRef::default_error()))],
        }
    }

    pub fn query(mut self, name: &str, sql_type: SqlType, required: bool) -> Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            location: ParamLocation::Query,
            sql_type,
            required,
        });
        self
    }

    /// Path parameters are always required.
    pub fn path(mut self, name: &str, sql_type: SqlType) -> Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            location: ParamLocation::Path,
            sql_type,
            required: true,
        });
        self
    }

    pub fn body(mut self, schema: SchemaRef) -> Self {
        self.request_body = Some(Payload::json(schema));
        self
    }

    pub fn binary_body(mut self, content_type: &str) -> Self {
        self.request_body = Some(Payload::Binary {
            content_type: content_type.to_string(),
        });
        self
    }

    pub fn response(self, code: u16, schema: SchemaRef) -> Self {
        self.with_response(code.to_string(), Payload::json(schema))
    }

    pub fn binary_response(self, code: u16, content_type: &str) -> Self {
        self.with_response(
            code.to_string(),
            Payload::Binary {
                content_type: content_type.to_string(),
            },
        )
    }

    fn with_response(mut self, code: String, payload: Payload) -> Self {
        match self.responses.iter_mut().find(|(c, _)| *c == code) {
            Some(existing) => existing.1 = payload,
            None => self.responses.push((code, payload)),
        }
        self
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub(crate) fn to_operation(&self, tag: &str) -> Value {
        let parameters: Vec<Value> = self
            .parameters
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "in": p.location.as_str(),
                    "required": p.required,
                    "schema": { "type": p.sql_type.json_type() }
                })
            })
            .collect();
        let mut responses = Map::new();
        for (code, payload) in &self.responses {
            responses.insert(code.clone(), json!({ "description": "", "content": payload.content() }));
        }
        let mut operation = json!({
            "summary": self.summary,
            "tags": [tag],
            "parameters": parameters,
            "responses": responses
        });
        if let Some(body) = &self.request_body {
            operation["requestBody"] = json!({ "required": true, "content": body.content() });
        }
        operation
    }
}

/// A route added next to the defaults. `path` is relative to the table path, e.g. `/:id/publish`.
#[derive(Clone)]
pub struct CustomRoute {
    pub method: Method,
    pub path: String,
    pub handler: MethodRouter<AppState>,
    pub schema: OperationSchema,
}

impl CustomRoute {
    pub(crate) fn method_name(&self) -> &'static str {
        match self.method {
            Method::POST => "post",
            Method::PUT => "put",
            Method::DELETE => "delete",
            _ => "get",
        }
    }
}

/// Route configuration of one table. The five defaults start enabled.
#[derive(Clone)]
pub struct RouteTable {
    pub get_all: bool,
    pub get_single: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
    custom: Vec<CustomRoute>,
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTable {
            get_all: true,
            get_single: true,
            create: true,
            update: true,
            delete: true,
            custom: Vec::new(),
        }
    }
}

impl RouteTable {
    pub fn get<H, T>(&mut self, path: &str, schema: OperationSchema, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.push(Method::GET, path, schema, routing::get(handler))
    }

    pub fn post<H, T>(&mut self, path: &str, schema: OperationSchema, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.push(Method::POST, path, schema, routing::post(handler))
    }

    pub fn put<H, T>(&mut self, path: &str, schema: OperationSchema, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.push(Method::PUT, path, schema, routing::put(handler))
    }

    pub fn delete<H, T>(&mut self, path: &str, schema: OperationSchema, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.push(Method::DELETE, path, schema, routing::delete(handler))
    }

    fn push(&mut self, method: Method, path: &str, schema: OperationSchema, handler: MethodRouter<AppState>) -> &mut Self {
        self.custom.push(CustomRoute {
            method,
            path: path.to_string(),
            handler,
            schema,
        });
        self
    }

    pub fn custom(&self) -> &[CustomRoute] {
        &self.custom
    }

    /// Disables every default route; custom routes are kept.
    pub fn disable_defaults(&mut self) {
        self.get_all = false;
        self.get_single = false;
        self.create = false;
        self.update = false;
        self.delete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_response_is_always_documented() {
        let operation = OperationSchema::new("Count rows")
            .query("since", SqlType::DATE, false)
            .response(200, SchemaRef::named("Count"))
            .to_operation("post");
        assert_eq!(
            operation["responses"]["default"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/DEFAULT_ERROR"
        );
        assert_eq!(
            operation["responses"]["200"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/Count"
        );
        assert_eq!(operation["parameters"][0]["in"], "query");
        assert_eq!(operation["parameters"][0]["schema"]["type"], "string");
        assert_eq!(operation["tags"][0], "post");
        assert!(operation.get("requestBody").is_none());
    }

    #[test]
    fn binary_bodies_document_raw_bytes() {
        let operation = OperationSchema::new("Upload")
            .path("id", SqlType::BIGINT)
            .binary_body("image/png")
            .to_operation("post");
        assert_eq!(
            operation["requestBody"]["content"]["image/png"]["schema"],
            json!({ "type": "string", "format": "binary" })
        );
        assert_eq!(operation["parameters"][0]["required"], true);
    }

    #[test]
    fn defaults_start_enabled() {
        let mut routes = RouteTable::default();
        assert!(routes.get_all && routes.get_single && routes.create && routes.update && routes.delete);
        routes.get("/count", OperationSchema::new("Count"), || async { "0" });
        routes.disable_defaults();
        assert!(!routes.get_all && !routes.delete);
        assert_eq!(routes.custom().len(), 1);
        assert_eq!(routes.custom()[0].method_name(), "get");
    }
}
