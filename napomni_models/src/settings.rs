use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TelegramSettings {
    pub token: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSettings {
    pub database_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TimeSettings {
    /// Offset of the users' local time from UTC, e.g. `180` for UTC+3.
    pub utc_offset_minutes: i32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DispatchSettings {
    pub interval_secs: u64,
    pub delivery_timeout_secs: u64,
    pub max_delivery_attempts: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub telegram: TelegramSettings,
    pub storage: StorageSettings,
    pub time: TimeSettings,
    pub dispatch: DispatchSettings,
}
