//! Configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `config/default.*` file in the working directory, an explicit file passed
//! by the caller, and `RELAY__<SECTION>__<KEY>` environment variables
//! (`RELAY__RELAY__TOPICS` takes a comma-separated list).

mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;
pub use settings::{RelaySettings, ServerSettings, Settings};

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like [`load_config`], with an extra required file layered on top of the default one.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("relay.topics"),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge_onto(Settings::default()))
}

#[cfg(test)]
mod tests;
