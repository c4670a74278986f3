//! Service configuration: JSON file validated against an embedded
//! JSON Schema plus semantic checks.

pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    Config, DatabaseConfig, PreprocessConfig, ProvidersConfig, QuotaConfig, ServerConfig,
    ThumbnailConfig,
};
