//! Example consumer: a small blog served by tabula-sdk.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! With `DATABASE_URL` set, rows live in PostgreSQL (tables must already exist); otherwise in memory.

use std::sync::Arc;

use axum::{routing::get, Json};
use tabula_sdk::column::{Column, ColumnFlags, KeyColumn};
use tabula_sdk::{
    init_tracing, openapi_document, table_fields, table_routes, AppState, Authentication, Bridge,
    Engine, LoadMode, MemoryBridge, PgBridge, Relation, RelationMany, Settings, SqlType, StaticTokens, Table,
    TableBase,
};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
struct Author {
    base: TableBase,
    name: Column<String>,
    posts: RelationMany<Post>,
}

fn post_author(post: &Post) -> &dyn KeyColumn {
    &post.author
}

impl Table for Author {
    const NAME: &'static str = "Author";

    fn new() -> Self {
        Author {
            base: TableBase::new(Self::NAME),
            name: Column::new(SqlType::varchar(80), ColumnFlags::NONE),
            posts: RelationMany::with_mode(post_author, LoadMode::Lazy),
        }
    }

    table_fields!(base; name, posts);
}

#[derive(Clone, Debug)]
struct Post {
    base: TableBase,
    title: Column<String>,
    body: Column<String>,
    published: Column<chrono::DateTime<chrono::Utc>>,
    author: Relation<Author>,
}

impl Table for Post {
    const NAME: &'static str = "Post";

    fn new() -> Self {
        Post {
            base: TableBase::new(Self::NAME),
            title: Column::new(SqlType::varchar(120), ColumnFlags::NONE),
            body: Column::new(SqlType::TEXT, ColumnFlags::NULLABLE),
            published: Column::new(SqlType::DATETIME, ColumnFlags::NULLABLE),
            author: Relation::new(ColumnFlags::NONE),
        }
    }

    table_fields!(base; title, body, published, author);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    init_tracing("tabula_sdk=info,example_consumer=info");

    let bridge: Arc<dyn Bridge> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            Arc::new(PgBridge::new(pool))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, storing rows in memory");
            Arc::new(MemoryBridge::new())
        }
    };

    let engine = Engine::with_settings(bridge, settings)?;
    engine.register::<Author>()?;
    engine.register::<Post>()?;
    engine.events::<Post>()?.after_insert.on(|args| async move {
        if let Some(post) = args.row() {
            tracing::info!(id = ?post.id(), "post created");
        }
        Ok(())
    });

    let document = openapi_document(&engine, "Blog", env!("CARGO_PKG_VERSION"));
    let tokens = StaticTokens::new()
        .with("root", Authentication::root())
        .with("alice", Authentication::principal(2, "alice"));

    let app = table_routes(AppState::new(engine, tokens))
        .route(
            "/openapi.json",
            get(move || {
                let document = document.clone();
                async move { Json(document) }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
