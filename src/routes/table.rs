//! Generated table routes: five defaults per table plus its custom routes.

use axum::routing::MethodRouter;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use super::RouteTable;
use crate::handlers::table::{create, delete, list, read, update};
use crate::registry::TableMeta;
use crate::state::AppState;
use crate::table::Table;

/// Adds the enabled routes of `T` under `/<full_name>`.
pub(crate) fn mount<T: Table>(router: Router<AppState>, meta: &TableMeta, routes: &RouteTable) -> Router<AppState> {
    let base = format!("/{}", meta.full_name);
    let single = format!("{}/:id", base);
    let mut router = router;

    let mut collection: MethodRouter<AppState> = MethodRouter::new();
    if routes.get_all {
        collection = collection.get(list::<T>);
    }
    if routes.create {
        collection = collection.post(create::<T>);
    }
    if routes.get_all || routes.create {
        router = router.route(&base, collection);
    }

    let mut item: MethodRouter<AppState> = MethodRouter::new();
    if routes.get_single {
        item = item.get(read::<T>);
    }
    if routes.update {
        item = item.put(update::<T>);
    }
    if routes.delete {
        item = item.delete(delete::<T>);
    }
    if routes.get_single || routes.update || routes.delete {
        router = router.route(&single, item);
    }

    for custom in routes.custom() {
        router = router.route(&format!("{}{}", base, custom.path), custom.handler.clone());
    }
    router
}

/// Router over every registered table, under the configured prefix and body limit.
pub fn table_routes(state: AppState) -> Router {
    let settings = state.engine.settings().clone();
    let mut router: Router<AppState> = Router::new();
    for table in state.engine.registered() {
        tracing::debug!(
            table = %table.meta.full_name,
            custom = table.routes.custom().len(),
            "mounting table routes"
        );
        router = (table.mount)(router, &table.meta, &table.routes);
    }
    if !settings.api_prefix.is_empty() {
        router = Router::new().nest(&settings.api_prefix, router);
    }
    router
        .layer(RequestBodyLimitLayer::new(settings.body_limit))
        .with_state(state)
}
