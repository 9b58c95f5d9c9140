use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use napomni_models::settings::Settings;

const DEFAULT_DATABASE_URL: &str = "sqlite://reminders.db";

/// Layers `appsettings`, the optional `appsettings.local` and `APP__*`
/// environment variables (e.g. `APP__TELEGRAM__TOKEN`) over the defaults.
pub fn load() -> Result<Settings, ConfigError> {
    with_defaults()?
        .add_source(File::with_name("appsettings").required(true))
        .add_source(File::with_name("appsettings.local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()
}

fn with_defaults() -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("storage.database_url", DEFAULT_DATABASE_URL)?
        .set_default("time.utc_offset_minutes", 180_i64)?
        .set_default("dispatch.interval_secs", 60_i64)?
        .set_default("dispatch.delivery_timeout_secs", 10_i64)?
        .set_default("dispatch.max_delivery_attempts", 5_i64)
}
