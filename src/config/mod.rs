mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, HubSettings, LogSettings, ServerSettings, SessionSettings, Settings,
};

/// Prefix for environment overrides, e.g. `WSFANOUT_BROKER__URI`.
pub const ENV_PREFIX: &str = "WSFANOUT";

/// Loads the configuration from the default file and environment variables
/// and merges it over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = partial.merge(Settings::default());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests;
