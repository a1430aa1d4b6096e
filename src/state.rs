//! Shared application state for generated routes.

use std::sync::Arc;

use crate::extractors::Authenticator;
use crate::service::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(engine: Engine, authenticator: impl Authenticator + 'static) -> Self {
        AppState {
            engine,
            authenticator: Arc::new(authenticator),
        }
    }
}
