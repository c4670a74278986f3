use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let compiled =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
            message: format!("Failed to compile JSON schema: {}", e),
        })?;

    let mut errors = compiled.iter_errors(json_value).peekable();
    if errors.peek().is_some() {
        let error_messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path()))
            .collect();
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.quota.monthly_limit == 0 {
        return Err(ConfigError::Validation {
            message: "quota.monthlyLimit must be at least 1".to_string(),
        });
    }

    if config.preprocess.jpeg_quality == 0 || config.preprocess.jpeg_quality > 100 {
        return Err(ConfigError::Validation {
            message: format!(
                "preprocess.jpegQuality must be 1-100, got {}",
                config.preprocess.jpeg_quality
            ),
        });
    }

    for (name, url) in [
        ("providers.ocrUrl", &config.providers.ocr_url),
        ("providers.classifierUrl", &config.providers.classifier_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation {
                message: format!("{} must be an http(s) URL, got '{}'", name, url),
            });
        }
    }

    Ok(())
}
