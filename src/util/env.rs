//! Process configuration.
//!
//! Values are read once at start-up (optionally from a `.env` file) into a [`Config`] that is
//! handed to whichever component needs it. Nothing in here is global.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_CATALOG_BASE_URL, DEFAULT_CATALOG_MAX_PAGES, DEFAULT_CATALOG_MAX_RETRIES,
    DEFAULT_CATALOG_REQUESTS_PER_SECOND, DEFAULT_CATALOG_TIMEOUT_SECS, DEFAULT_DB_MAX_CONNECTIONS,
    DEFAULT_SERVER_PORT, DEFAULT_SERVICE_NAME, DEFAULT_TRACER_NAME,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub requests_per_second: usize,
    pub max_pages: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `None` allows any origin
    pub cors_allow_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub tracer_name: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> EnvResult<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(EnvErr::Dotenvy(e));
        }

        Self::from_vars(&Vars::from_iter(dotenvy::vars()))
    }

    pub fn from_vars(vars: &Vars) -> EnvResult<Self> {
        let timeout_secs: u64 = vars.or("CATALOG_TIMEOUT_SECS", DEFAULT_CATALOG_TIMEOUT_SECS)?;

        Ok(Self {
            database: DatabaseConfig {
                url: vars.required("DATABASE_URL")?,
                max_connections: vars.or("DATABASE_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            },
            catalog: CatalogConfig {
                base_url: vars
                    .or("RAWG_BASE_URL", DEFAULT_CATALOG_BASE_URL.to_string())?
                    .trim_end_matches('/')
                    .to_string(),
                api_key: vars.required("RAWG_API_KEY")?,
                timeout: Duration::from_secs(timeout_secs),
                max_retries: vars.or("CATALOG_MAX_RETRIES", DEFAULT_CATALOG_MAX_RETRIES)?,
                requests_per_second: vars
                    .or("CATALOG_REQUESTS_PER_SECOND", DEFAULT_CATALOG_REQUESTS_PER_SECOND)?
                    .max(1),
                max_pages: vars.or("CATALOG_MAX_PAGES", DEFAULT_CATALOG_MAX_PAGES)?,
            },
            server: ServerConfig {
                port: vars.or("SERVER_API_PORT", DEFAULT_SERVER_PORT)?,
                cors_allow_origins: vars.optional::<String>("CORS_ALLOW_ORIGINS")?.map(|list| {
                    list.split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                }),
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: vars.optional("OTEL_EXPORTER_OTLP_ENDPOINT")?,
                service_name: vars.or("API_SERVICE_NAME", DEFAULT_SERVICE_NAME.to_string())?,
                tracer_name: vars.or("API_TRACER_NAME", DEFAULT_TRACER_NAME.to_string())?,
            },
        })
    }
}

#[cfg(test)]
impl CatalogConfig {
    /// Fast, unthrottled settings pointed at a mock catalog
    pub fn for_tests(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(2),
            max_retries: 2,
            requests_per_second: 1000,
            max_pages: 10,
        }
    }
}

/// Snapshot of `(key, value)` pairs that config values are parsed out of
#[derive(Debug, Default)]
pub struct Vars {
    inner: HashMap<String, String>,
}

impl Vars {
    pub fn from_iter<Iter>(iter: Iter) -> Self
    where
        Iter: IntoIterator<Item = (String, String)>,
    {
        Self {
            inner: iter.into_iter().collect(),
        }
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn required<T>(&self, key: &str) -> EnvResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key)?
            .ok_or_else(|| EnvErr::MissingValue(key.to_string()))
    }

    pub fn optional<T>(&self, key: &str) -> EnvResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.raw(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| EnvErr::Invalid {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn or<T>(&self, key: &str, default: T) -> EnvResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.optional(key)?.unwrap_or(default))
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("missing required environment variable '{0}'")]
    MissingValue(String),

    #[error("{reason}: while parsing '{value}' (provider: {key})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}
