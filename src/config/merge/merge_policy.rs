//! Merge rules: defaults, override order, conflict handling.

use crate::config::{ContextConfig, ContextOverrides};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("readonly", false)?
        .set_default("write", false)?
        .set_default("ignore_bookmarks", false)
}

/// Apply overrides to a base configuration. Set override fields win field-by-field;
/// transaction metadata merges key-by-key with override keys winning.
pub fn apply(base: &ContextConfig, overrides: &ContextOverrides) -> ContextConfig {
    let mut merged = base.clone();
    if let Some(url) = &overrides.url {
        merged.url = Some(url.clone());
    }
    if let Some(database) = &overrides.database {
        merged.database = Some(database.clone());
    }
    if let Some(readonly) = overrides.readonly {
        merged.readonly = readonly;
    }
    if let Some(write) = overrides.write {
        merged.write = write;
    }
    if let Some(ignore) = overrides.ignore_bookmarks {
        merged.ignore_bookmarks = ignore;
    }
    if let Some(fetch_size) = overrides.fetch_size {
        merged.driver.fetch_size = fetch_size;
    }
    if let Some(timeout_ms) = overrides.transaction_timeout_ms {
        merged.transaction.timeout_ms = Some(timeout_ms);
    }
    for (key, value) in &overrides.transaction_metadata {
        merged.transaction.metadata.insert(key.clone(), value.clone());
    }
    merged
}
