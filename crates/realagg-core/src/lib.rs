pub mod app_config;
pub mod config;
pub mod filters;
pub mod record;
pub mod settings;
pub mod types;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use filters::{Decision, FilterPolicy};
pub use record::ListingRecord;
pub use settings::{
    load_settings, DatabaseSettings, QualityFilters, SchedulerSettings, SearchFilters, Settings,
    SourceTuning, TypeFilter,
};
pub use types::{OfferType, PropertyType};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read settings file {path}: {source}")]
    SettingsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file: {0}")]
    SettingsFileParse(#[source] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
