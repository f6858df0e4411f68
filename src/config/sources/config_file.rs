//! Config file source: a TOML (or any format the `config` crate recognises) file on disk.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;
use tracing::warn;

/// Add a config file source to the builder.
/// A missing optional file only logs a warning; a missing required file fails the build.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.exists() {
        if required {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        warn!(
            config_path = %path.display(),
            "Configuration file not found; continuing with defaults and environment"
        );
        return Ok(builder);
    }
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Ok(builder.add_source(File::from(canonical).required(required)))
}
