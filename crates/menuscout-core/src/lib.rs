pub mod app_config;
pub mod config;
pub mod entities;
pub mod normalize;
pub mod raw;
pub mod targets;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, RetrySettings};
pub use config::{load_app_config, load_app_config_from_env};
pub use entities::{Category, Entity, Product, Restaurant};
pub use normalize::{normalize_text, parse_price, parse_rating, slug_from_url, slugify};
pub use raw::{RawCategory, RawProduct, RawRestaurant, RecordError};
pub use targets::{load_targets, TargetConfig, TargetsFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read targets file {path}: {source}")]
    TargetsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse targets file: {0}")]
    TargetsFileParse(#[from] serde_yaml::Error),

    #[error("targets validation failed: {0}")]
    Validation(String),
}
