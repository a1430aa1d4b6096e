//! HTTP handlers for generated table routes.

pub mod table;
