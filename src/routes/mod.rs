//! Route tables per entity and the generated axum routers.

mod manager;
mod table;

pub use manager::{CustomRoute, OperationSchema, ParamLocation, Parameter, Payload, RouteTable};
pub(crate) use table::mount;
pub use table::table_routes;
