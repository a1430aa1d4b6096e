//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::table::Diagnostic;

/// Declaration and registration errors. Not recoverable; surfaced to the integrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("ambiguous name '{0}': table was already declared once")]
    DuplicateTable(String),
    #[error("1:N relation '{relation}' must target a column of type BIGINT, found {found} on '{column}'")]
    RelationTarget {
        relation: String,
        column: String,
        found: String,
    },
    #[error("size must be an integer: {0}")]
    InvalidSize(String),
    #[error("unknown column type: {0}")]
    UnknownType(String),
    #[error("table not registered: {0}")]
    NotRegistered(&'static str),
    #[error("schema name already in use: {0}")]
    DuplicateSchema(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: &'static str, value: String },
}

/// Column access errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColumnError {
    #[error("column '{0}' is null")]
    Null(String),
    #[error("column '{0}' cannot be null")]
    CannotBeNull(String),
    #[error("column '{column}' does not hold a {expected} value")]
    Mismatch { column: String, expected: String },
}

/// Failure to import a wire value into a typed column value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("wrong date format: {0}")]
    WrongDate(String),
    #[error("wrong time format: {0}")]
    WrongTime(String),
    #[error("wrong datetime format: {0}")]
    WrongDateTime(String),
    #[error("expected {expected}, got {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("value {value} out of range for {sql_type}")]
    OutOfRange { value: String, sql_type: String },
    #[error("column '{0}' cannot be null")]
    Null(String),
}

/// One failed field during `serialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub column: String,
    pub error: ImportError,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.column, self.error)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("record for '{table}' has no value for '{column}'")]
    MissingKey { table: String, column: String },
    #[error("bridge: {0}")]
    Backend(String),
}

/// A subscriber failed while an event phase was emitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("event subscriber failed: {0}")]
pub struct EventError(pub String);

impl EventError {
    pub fn new(message: impl Into<String>) -> Self {
        EventError(message.into())
    }
}

/// Lifecycle errors raised by the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error("cannot {operation} '{table}' row because of missing permission")]
    Permission {
        table: String,
        operation: &'static str,
    },
    #[error("cannot {operation} '{table}' row because it was never inserted")]
    NotInserted {
        table: String,
        operation: &'static str,
    },
    #[error("operation {operation} not performable on '{table}'")]
    NotPerformable {
        table: String,
        operation: &'static str,
    },
    #[error("invalid '{table}' row: {}", join(.diagnostics))]
    Invalid {
        table: String,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("cannot import '{table}' row: {}", join(.errors))]
    Import {
        table: String,
        errors: Vec<FieldError>,
    },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Event(#[from] EventError),
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Engine(EngineError::Config(e))
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Engine(e) => match e {
                EngineError::Permission { .. } => (StatusCode::FORBIDDEN, "forbidden"),
                EngineError::NotInserted { .. } => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::NotPerformable { .. } => (StatusCode::METHOD_NOT_ALLOWED, "not_performable"),
                EngineError::Invalid { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
                EngineError::Import { .. } | EngineError::Column(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                EngineError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
                EngineError::Bridge(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                EngineError::Event(_) => (StatusCode::INTERNAL_SERVER_ERROR, "event_error"),
            },
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Engine(EngineError::Invalid { diagnostics, .. }) => Some(serde_json::Value::Array(
                diagnostics.iter().map(|d| serde_json::Value::String(d.to_string())).collect(),
            )),
            AppError::Engine(EngineError::Import { errors, .. }) => Some(serde_json::Value::Array(
                errors.iter().map(|e| serde_json::Value::String(e.to_string())).collect(),
            )),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}
