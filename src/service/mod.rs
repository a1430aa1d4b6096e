//! Engine: registration, permission checks and the row lifecycle.

mod engine;
mod validation;
pub use engine::{Engine, TableHandle};
pub use validation::RowValidator;
