//! Configuration System
//!
//! The configuration surface recognised by the context layer: connection endpoint, target
//! database, access-mode flags and the ignore-bookmarks flag, plus driver, transaction and
//! logging settings. Loaded hierarchically (defaults, optional TOML file, `CAIRN_*`
//! environment variables) and overridden per derived context with [`ContextOverrides`].

use crate::error::ContextError;
use crate::logging::LoggingConfig;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use crate::driver::{DriverConfig, TransactionConfig};

mod facade;
pub mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use merge::merge_policy;

/// Root configuration of a context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Connection endpoint, e.g. `memory://primary` or `neo4j://db.internal:7687`
    #[serde(default)]
    pub url: Option<String>,

    /// Target database name (backend default when unset)
    #[serde(default)]
    pub database: Option<String>,

    /// Force read access mode. Wins over `write`.
    #[serde(default)]
    pub readonly: bool,

    /// Force write access mode
    #[serde(default)]
    pub write: bool,

    /// Do not thread causal bookmarks into sessions
    #[serde(default)]
    pub ignore_bookmarks: bool,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub transaction: TransactionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ContextConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// The configured endpoint, if it is present and has a `scheme://rest` shape.
    pub fn endpoint(&self) -> Result<&str, ContextError> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ContextError::Configuration("No connection endpoint configured".to_string())
            })?;
        match url.split_once("://") {
            Some((scheme, rest))
                if !scheme.is_empty()
                    && !rest.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '+') =>
            {
                Ok(url)
            }
            _ => Err(ContextError::Configuration(format!(
                "Invalid connection endpoint '{}': expected scheme://host",
                url
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        self.endpoint()?;
        if self.driver.fetch_size == 0 {
            return Err(ContextError::Configuration(
                "driver.fetch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-derivation overrides. Every set field wins over the base configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOverrides {
    pub url: Option<String>,
    pub database: Option<String>,
    pub readonly: Option<bool>,
    pub write: Option<bool>,
    pub ignore_bookmarks: Option<bool>,
    pub fetch_size: Option<usize>,
    pub transaction_timeout_ms: Option<u64>,
    /// Merged key-by-key into the base transaction metadata
    pub transaction_metadata: BTreeMap<String, Value>,
}

impl ContextOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = Some(write);
        self
    }

    pub fn ignore_bookmarks(mut self, ignore: bool) -> Self {
        self.ignore_bookmarks = Some(ignore);
        self
    }

    pub fn fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    pub fn transaction_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.transaction_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn transaction_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.transaction_metadata.insert(key.into(), value.into());
        self
    }
}
