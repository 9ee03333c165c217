//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::engine::BatchConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub store: StoreLocation,
    pub processor: ProcessorConfig,
    pub batch: BatchConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Where work items are read from and results written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub schema: String,
    pub source_table: String,
    pub target_table: String,
}

impl StoreLocation {
    /// Build a location, rejecting anything that is not a plain SQL identifier.
    pub fn new(
        schema: impl Into<String>,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Result<Self> {
        let location = Self {
            schema: schema.into(),
            source_table: source_table.into(),
            target_table: target_table.into(),
        };
        validate_identifier("STORE_SCHEMA", &location.schema)?;
        validate_identifier("SOURCE_TABLE", &location.source_table)?;
        validate_identifier("TARGET_TABLE", &location.target_table)?;
        if location.source_table == location.target_table {
            return Err(Error::Config(
                "SOURCE_TABLE and TARGET_TABLE must differ".to_string(),
            ));
        }
        Ok(location)
    }

    /// Quoted, schema-qualified source table name.
    pub fn source(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.source_table)
    }

    /// Quoted, schema-qualified target table name.
    pub fn target(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.target_table)
    }
}

/// Settings for the external processor endpoint.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub endpoint: String,
    /// Optional bearer token. The endpoint is assumed open when absent.
    pub token: Option<SecretString>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, the job's environment provides the vars.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| {
                Error::Config(format!("required environment variable {name} is not set"))
            })
        };

        let store = StoreLocation::new(
            var("STORE_SCHEMA").unwrap_or_else(|| "public".to_string()),
            required("SOURCE_TABLE")?,
            required("TARGET_TABLE")?,
        )?;

        let endpoint = required("PROCESSOR_URL")?;
        let parsed = reqwest::Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("PROCESSOR_URL is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "PROCESSOR_URL must be http or https, got {}",
                parsed.scheme()
            )));
        }

        let defaults = BatchConfig::default();
        let batch = BatchConfig {
            batch_size: positive(&var, "BATCH_SIZE", defaults.batch_size)?,
            max_concurrent: positive(&var, "MAX_CONCURRENT", defaults.max_concurrent)?,
            call_timeout: Duration::from_secs(positive(
                &var,
                "PROCESSOR_TIMEOUT_SECS",
                defaults.call_timeout.as_secs() as usize,
            )? as u64),
        };

        Ok(Self {
            database_url: SecretString::from(required("DATABASE_URL")?),
            store,
            processor: ProcessorConfig {
                endpoint,
                token: var("PROCESSOR_TOKEN").map(SecretString::from),
            },
            batch,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn positive<F>(var: &F, name: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(Error::Config(format!("{name} must be at least 1"))),
        Ok(n) => Ok(n),
        Err(_) => Err(Error::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

fn validate_identifier(name: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && value.len() <= 63 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{name} must be a plain SQL identifier, got {value:?}"
        )))
    }
}
