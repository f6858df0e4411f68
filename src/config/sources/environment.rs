//! Environment source: `CAIRN_*` variables, nested keys separated by `__`.
//!
//! `CAIRN_URL=memory://primary`, `CAIRN_READONLY=true`, `CAIRN_DRIVER__FETCH_SIZE=200`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "CAIRN";

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}
