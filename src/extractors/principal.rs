//! Resolve the calling principal from a bearer token.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::security::Authentication;
use crate::state::AppState;

/// Maps a bearer token to a principal. Credential verification lives with the implementor.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` for an unknown token.
    async fn authenticate(&self, token: &str) -> Result<Option<Authentication>, AppError>;
}

/// Fixed token table, for demos and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Authentication>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: impl Into<String>, principal: Authentication) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokens {
    async fn authenticate(&self, token: &str) -> Result<Option<Authentication>, AppError> {
        Ok(self.tokens.get(token).cloned())
    }
}

/// Token part of `Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty()).then_some(token)
}

/// The caller; `None` when no `Authorization` header was sent.
#[derive(Clone, Debug)]
pub struct Principal(pub Option<Authentication>);

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Principal(None));
        };
        let token = header
            .to_str()
            .ok()
            .and_then(bearer_token)
            .ok_or_else(|| AppError::Unauthorized("expected a bearer token".into()))?;
        match state.authenticator.authenticate(token).await? {
            Some(principal) => Ok(Principal(Some(principal))),
            None => {
                tracing::debug!("rejected unknown bearer token");
                Err(AppError::Unauthorized("invalid token".into()))
            }
        }
    }
}
