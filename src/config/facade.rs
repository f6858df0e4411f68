//! Config loader: assembles defaults, file and environment sources into a [`ContextConfig`].

use crate::config::merge::merge_policy;
use crate::config::sources::{config_file, environment};
use crate::config::ContextConfig;
use config::ConfigError;
use std::path::Path;

/// Loads [`ContextConfig`] from layered sources.
///
/// Precedence (highest to lowest):
/// 1. `CAIRN_*` environment variables
/// 2. Configuration file
/// 3. Defaults
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, reading `path` if it exists.
    pub fn load(path: Option<&Path>) -> Result<ContextConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        if let Some(path) = path {
            builder = config_file::add_to_builder(builder, path, false)?;
        }
        builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load configuration from a file that must exist. Environment variables are not consulted.
    pub fn load_from_file(path: &Path) -> Result<ContextConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = config_file::add_to_builder(builder, path, true)?;
        builder.build()?.try_deserialize()
    }
}
