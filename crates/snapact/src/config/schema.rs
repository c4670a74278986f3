//! Service configuration structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level service configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Config format version. Currently "1.0".
    pub version: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    /// When set, every submission is rejected with `maintenance_mode`.
    #[serde(default)]
    pub maintenance_mode: bool,

    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Socket address the HTTP server listens on.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/snapact.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    /// Endpoint of the text-extraction capability.
    pub ocr_url: String,
    /// Endpoint of the classification capability.
    pub classifier_url: String,
    /// Bearer token sent to both providers.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ocr_url: "http://127.0.0.1:9090/ocr".to_string(),
            classifier_url: "http://127.0.0.1:9090/classify".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaConfig {
    /// Ready jobs allowed per owner per calendar month.
    pub monthly_limit: u32,
    /// Allow submissions when the quota count itself fails.
    pub fail_open: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            monthly_limit: 50,
            fail_open: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessConfig {
    /// Longest image side after downscaling, in pixels.
    pub max_dimension: u32,
    /// JPEG quality for the re-encoded image.
    pub jpeg_quality: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1600,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailConfig {
    /// Longest thumbnail side, in pixels.
    pub max_dimension: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_dimension: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = serde_json::from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(config.quota.monthly_limit, 50);
        assert!(config.quota.fail_open);
        assert!(!config.maintenance_mode);
        assert_eq!(config.preprocess.max_dimension, 1600);
        assert_eq!(config.thumbnail.max_dimension, 256);
    }

    #[test]
    fn test_camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{
                "version": "1.0",
                "quota": {"monthlyLimit": 10, "failOpen": false},
                "maintenanceMode": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.quota.monthly_limit, 10);
        assert!(!config.quota.fail_open);
        assert!(config.maintenance_mode);
    }
}
