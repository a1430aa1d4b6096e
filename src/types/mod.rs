//! Scalar type registry.

mod sql_type;
mod value;

pub use sql_type::{SqlType, TypeCategory};
pub use value::{ColumnValue, Datum};
