//! Default table handlers: list, read, create, update, delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::extractors::Principal;
use crate::response::{success_many, success_one, success_one_ok};
use crate::security::{Authentication, PermissionLevel};
use crate::service::Engine;
use crate::state::AppState;
use crate::table::{LevelOverrides, Table};

/// `?read=&write=&delete=` level codes on create.
#[derive(Debug, Default, Deserialize)]
pub struct LevelQuery {
    pub read: Option<i64>,
    pub write: Option<i64>,
    pub delete: Option<i64>,
}

fn level(name: &str, code: Option<i64>) -> Result<Option<PermissionLevel>, AppError> {
    code.map(|c| {
        PermissionLevel::from_code(c)
            .ok_or_else(|| AppError::BadRequest(format!("{} must be 0, 1 or 2, got {}", name, c)))
    })
    .transpose()
}

impl LevelQuery {
    pub fn overrides(&self) -> Result<LevelOverrides, AppError> {
        Ok(LevelOverrides {
            read: level("read", self.read)?,
            write: level("write", self.write)?,
            delete: level("delete", self.delete)?,
        })
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Resolves DIRECT relations, then renders the client map.
async fn render<T: Table>(engine: &Engine, mut row: T, principal: Option<&Authentication>) -> Result<Value, AppError> {
    engine.resolve(&mut row, principal).await?;
    engine.resolve_many(&mut row, principal).await?;
    Ok(Value::Object(row.deserialize()?))
}

async fn fetch<T: Table>(engine: &Engine, principal: Option<&Authentication>, id: i64) -> Result<T, AppError> {
    engine
        .select::<T>(principal, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", T::table_name(), id)))
}

pub async fn list<T: Table>(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> Result<impl IntoResponse, AppError> {
    let engine = &state.engine;
    let rows = engine.select_all::<T>(principal.as_ref()).await?;
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        data.push(render(engine, row, principal.as_ref()).await?);
    }
    Ok(success_many(data))
}

pub async fn read<T: Table>(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let row = fetch::<T>(&state.engine, principal.as_ref(), id).await?;
    Ok(success_one_ok(render(&state.engine, row, principal.as_ref()).await?))
}

pub async fn create<T: Table>(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Query(levels): Query<LevelQuery>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let overrides = levels.overrides()?;
    let body = body_to_map(body)?;
    let mut row = T::new();
    row.merge_input(&body)?;
    state.engine.insert(&mut row, principal.as_ref(), overrides).await?;
    Ok(success_one(render(&state.engine, row, principal.as_ref()).await?))
}

pub async fn update<T: Table>(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let body = body_to_map(body)?;
    let mut row = fetch::<T>(&state.engine, principal.as_ref(), id).await?;
    row.merge_input(&body)?;
    state.engine.update(&mut row, principal.as_ref()).await?;
    Ok(success_one_ok(render(&state.engine, row, principal.as_ref()).await?))
}

pub async fn delete<T: Table>(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut row = fetch::<T>(&state.engine, principal.as_ref(), id).await?;
    state.engine.delete(&mut row, principal.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
