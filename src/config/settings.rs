//! Engine and HTTP settings. Read from `TABULA_*` environment variables after an optional `.env`.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const VALIDATION_ENV: &str = "TABULA_VALIDATION";
pub const BODY_LIMIT_ENV: &str = "TABULA_BODY_LIMIT";
pub const API_PREFIX_ENV: &str = "TABULA_API_PREFIX";

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// When row validation runs inside the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Callers invoke `validate()` themselves.
    #[default]
    OptIn,
    /// Insert and update reject rows with diagnostics.
    OnWrite,
}

impl std::str::FromStr for ValidationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opt_in" | "optin" | "off" => Ok(ValidationPolicy::OptIn),
            "on_write" | "onwrite" | "on" => Ok(ValidationPolicy::OnWrite),
            other => Err(ConfigError::InvalidSetting {
                key: VALIDATION_ENV,
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub validation: ValidationPolicy,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
    /// Path prefix for generated table routes, e.g. `/api`. Empty for none.
    pub api_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            validation: ValidationPolicy::OptIn,
            body_limit: DEFAULT_BODY_LIMIT,
            api_prefix: String::new(),
        }
    }
}

impl Settings {
    /// Loads `.env` if present, then reads the environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(v) = lookup(VALIDATION_ENV) {
            settings.validation = v.parse()?;
        }
        if let Some(v) = lookup(BODY_LIMIT_ENV) {
            settings.body_limit = v.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                key: BODY_LIMIT_ENV,
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup(API_PREFIX_ENV) {
            settings.api_prefix = normalize_prefix(&v);
        }
        Ok(settings)
    }
}

/// `"api/"` -> `"/api"`, `"/"` -> `""`.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
