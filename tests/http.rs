use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, Method, Request, StatusCode},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use tabula_sdk::column::{Column, ColumnFlags};
use tabula_sdk::table_fields;
use tabula_sdk::{
    openapi_document, table_routes, AppError, AppState, Authentication, Engine, MemoryBridge, OperationSchema,
    RouteTable, SchemaRef, Settings, SqlType, StaticTokens, Table, TableBase,
};

#[derive(Clone, Debug)]
struct Note {
    base: TableBase,
    title: Column<String>,
    pinned: Column<bool>,
}

async fn count_notes(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let all = state.engine.select_all::<Note>(Some(&Authentication::root())).await?;
    Ok(Json(json!({ "count": all.len() })))
}

impl Table for Note {
    const NAME: &'static str = "Note";

    fn new() -> Self {
        Note {
            base: TableBase::new(Self::NAME),
            title: Column::new(SqlType::varchar(40), ColumnFlags::NONE),
            pinned: Column::new(SqlType::BOOL, ColumnFlags::NULLABLE),
        }
    }

    fn configure_routes(routes: &mut RouteTable) {
        routes.get(
            "/count",
            OperationSchema::new("Count every note").response(200, SchemaRef::named("NoteCount")),
            count_notes,
        );
    }

    table_fields!(base; title, pinned);
}

fn engine_with(settings: Settings) -> Engine {
    let engine = Engine::with_settings(Arc::new(MemoryBridge::new()), settings).unwrap();
    engine.register::<Note>().unwrap();
    engine
        .define_schema("NoteCount", json!({ "type": "object", "properties": { "count": { "type": "integer" } } }))
        .unwrap();
    engine
}

fn app_with(settings: Settings) -> (Router, Engine) {
    let engine = engine_with(settings);
    let tokens = StaticTokens::new()
        .with("root-token", Authentication::root())
        .with("alice-token", Authentication::principal(2, "alice"))
        .with("bob-token", Authentication::principal(3, "bob"));
    (table_routes(AppState::new(engine.clone(), tokens)), engine)
}

fn app() -> Router {
    app_with(Settings::default()).0
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn create_then_read_as_owner() {
    let app = app();
    let (status, created) = call(&app, Method::POST, "/note", Some("alice-token"), Some(json!({ "title": "hello" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["note_id"], 1);
    assert_eq!(created["data"]["title"], "hello");
    assert_eq!(created["data"]["pinned"], Value::Null);
    assert!(created.get("meta").is_none());

    let (status, read) = call(&app, Method::GET, "/note/1", Some("alice-token"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["data"]["title"], "hello");

    let (status, _) = call(&app, Method::GET, "/note/1", Some("bob-token"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_create_is_forbidden_and_bad_tokens_unauthorized() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/note", None, Some(json!({ "title": "x" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, body) = call(&app, Method::GET, "/note", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn level_overrides_open_rows_to_anonymous_readers() {
    let app = app();
    call(&app, Method::POST, "/note?read=2", Some("alice-token"), Some(json!({ "title": "public" }))).await;
    call(&app, Method::POST, "/note", Some("alice-token"), Some(json!({ "title": "private" }))).await;

    let (status, list) = call(&app, Method::GET, "/note", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["meta"]["count"], 1);
    assert_eq!(list["data"][0]["title"], "public");

    let (_, list) = call(&app, Method::GET, "/note", Some("root-token"), None).await;
    assert_eq!(list["meta"]["count"], 2);

    let (status, _) = call(&app, Method::POST, "/note?read=7", Some("alice-token"), Some(json!({ "title": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_and_delete_follow_row_permissions() {
    let app = app();
    call(&app, Method::POST, "/note?read=1", Some("alice-token"), Some(json!({ "title": "v1" }))).await;

    let (status, _) = call(&app, Method::PUT, "/note/1", Some("bob-token"), Some(json!({ "title": "bob" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = call(&app, Method::PUT, "/note/1", Some("alice-token"), Some(json!({ "pinned": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["title"], "v1");
    assert_eq!(updated["data"]["pinned"], true);

    let (status, _) = call(&app, Method::DELETE, "/note/1", Some("bob-token"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, "/note/1", Some("alice-token"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, "/note/1", Some("root-token"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn import_errors_are_reported_together() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/note",
        Some("alice-token"),
        Some(json!({ "title": 5, "pinned": "yes" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn builtin_tables_expose_only_reads() {
    let app = app();
    let (status, _) = call(&app, Method::GET, "/permission", Some("root-token"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/authentication", Some("root-token"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::POST, "/authentication", Some("root-token"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn custom_routes_mount_under_the_table_path() {
    let app = app();
    call(&app, Method::POST, "/note", Some("alice-token"), Some(json!({ "title": "a" }))).await;
    call(&app, Method::POST, "/note", Some("bob-token"), Some(json!({ "title": "b" }))).await;
    let (status, body) = call(&app, Method::GET, "/note/count", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn api_prefix_applies_to_every_table_route() {
    let settings = Settings {
        api_prefix: "/api".into(),
        ..Settings::default()
    };
    let (app, _) = app_with(settings);
    let (status, _) = call(&app, Method::POST, "/api/note", Some("alice-token"), Some(json!({ "title": "a" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, Method::GET, "/note", Some("alice-token"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn document_lists_tables_schemas_and_custom_paths() {
    let engine = engine_with(Settings::default());
    let doc = openapi_document(&engine, "Notes", "1.0.0");

    assert_eq!(doc["openapi"], "3.1.0");
    let schemas = &doc["components"]["schemas"];
    assert!(schemas.get("DEFAULT_ERROR").is_some());
    assert!(schemas.get("NoteCount").is_some());
    assert_eq!(schemas["note_create"]["required"], json!(["title"]));
    assert!(schemas["note_select"]["properties"].get("permission_id").is_some());
    assert!(schemas["authentication_select"]["properties"].get("password").is_none());

    let paths = &doc["paths"];
    assert!(paths["/note"].get("get").is_some());
    assert!(paths["/note"].get("post").is_some());
    assert_eq!(paths["/note/{id}"]["put"]["parameters"][0]["name"], "id");
    assert_eq!(paths["/note/count"]["get"]["tags"][0], "note");
    assert!(paths.get("/permission").is_none());
    assert!(paths["/authentication"].get("post").is_none());
}
