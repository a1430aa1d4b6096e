//! Request extractors.

mod principal;

pub use principal::{Authenticator, Principal, StaticTokens};
