//! Configuration loading.
//!
//! Settings come from `config/default.{toml,yaml,json}` (optional) and then
//! from `POPCAST_`-prefixed environment variables, with `__` separating
//! nested keys, e.g. `POPCAST_BROKER__MAILBOX_CAPACITY=50`. Anything left
//! unset falls back to `Settings::default()`.

mod settings;

use config::{Config, Environment, File};

use crate::utils::error::Result;

pub use settings::{
    AdmissionSettings, BrokerSettings, LoggingSettings, PartialAdmissionSettings,
    PartialBrokerSettings, PartialLoggingSettings, PartialSettings, Settings,
};

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("POPCAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}
