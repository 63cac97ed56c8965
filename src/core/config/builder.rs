//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::validate_config;
use super::{Config, ConfigFile, Result};
use crate::core::error::AppError;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["./lead-enrich.toml", "./config.toml"];

/// Builder pattern for creating `Config` instances fluently.
///
/// Layers are applied as defaults, then the TOML file, then the overrides
/// set on the builder, and the result is validated.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    search_default_locations: bool,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self {
            search_default_locations: true,
            ..Self::default()
        }
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    /// Skip `./lead-enrich.toml` and `./config.toml` when no file is given.
    pub fn without_default_locations(mut self) -> Self {
        self.search_default_locations = false;
        self
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.overrides.pipeline.max_concurrency = Some(value);
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.network.request_timeout = Some(duration.as_secs());
        self
    }
    pub fn requests_per_second(mut self, value: f64) -> Self {
        self.overrides.network.requests_per_second = Some(value);
        self
    }
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.overrides.network.user_agent = Some(value.into());
        self
    }
    pub fn max_attempts(mut self, value: u32) -> Self {
        self.overrides.retry.max_attempts = Some(value);
        self
    }
    pub fn checkpoint_every(mut self, value: usize) -> Self {
        self.overrides.pipeline.checkpoint_every = Some(value);
        self
    }
    pub fn checkpoint_dir(mut self, dir: impl Into<String>) -> Self {
        self.overrides.pipeline.checkpoint_dir = Some(dir.into());
        self
    }
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.overrides.pipeline.key_field = Some(field.into());
        self
    }
    pub fn max_leads(mut self, value: usize) -> Self {
        self.overrides.pipeline.max_leads = Some(value);
        self
    }
    pub fn skip_first(mut self, value: usize) -> Self {
        self.overrides.pipeline.skip_first = Some(value);
        self
    }
    pub fn include_existing(mut self, enable: bool) -> Self {
        self.overrides.pipeline.include_existing = Some(enable);
        self
    }
    pub fn require_fields(mut self, fields: Vec<String>) -> Self {
        self.overrides.pipeline.require_fields = Some(fields);
        self
    }
    pub fn confidence_threshold(mut self, value: f64) -> Self {
        self.overrides.waterfall.confidence_threshold = Some(value);
        self
    }
    pub fn decision_maker_categories(mut self, categories: Vec<String>) -> Self {
        self.overrides.services.decision_maker_categories = Some(categories);
        self
    }
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.overrides.services.chat_model = Some(model.into());
        self
    }

    /// Builds the final `Config` object, applying defaults, file settings, overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            match load_config_file(path) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config);
                    loaded_path = Some(path.clone());
                    tracing::info!("Loaded base configuration from specified file: {}", path);
                }
                Err(e) => {
                    tracing::error!("Failed to load specified config file '{}': {}", path, e);
                    return Err(AppError::Config(format!(
                        "Failed to load specified configuration file '{}': {}",
                        path, e
                    )));
                }
            }
        } else if self.search_default_locations {
            tracing::debug!("No config file specified, checking default locations.");
            for path_str in DEFAULT_CONFIG_LOCATIONS {
                if !Path::new(path_str).exists() {
                    continue;
                }
                match load_config_file(path_str) {
                    Ok(file_config) => {
                        apply_file_config(&mut self.config, &file_config);
                        loaded_path = Some(path_str.to_string());
                        tracing::info!("Loaded base configuration from default location: {}", path_str);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load or parse default config '{}': {}", path_str, e);
                    }
                }
            }
            if loaded_path.is_none() {
                tracing::info!("No configuration file found. Using default values and overrides.");
            }
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;
        validate_config(&mut self.config)?;

        tracing::debug!("Final configuration built successfully.");
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConfigBuilder::new().without_default_locations().build().unwrap();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(180));
        assert_eq!(config.checkpoint_every, 10);
        assert_eq!(config.key_field, "_row_id");
        assert_eq!(config.retry_policy().max_attempts, 4);
        assert!(config.loaded_config_path.is_none());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lead-enrich.toml");
        fs::write(
            &path,
            r#"
            [network]
            requests_per_second = 2.5

            [pipeline]
            max_concurrency = 8
            checkpoint_every = 4

            [services]
            decision_maker_categories = ["ceo", "sales"]
            "#,
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .config_file(path.display().to_string())
            .max_concurrency(3)
            .build()
            .unwrap();

        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.checkpoint_every, 4);
        assert_eq!(config.requests_per_second, 2.5);
        assert_eq!(config.decision_maker_categories, vec!["ceo", "sales"]);
        assert!(config.loaded_config_path.is_some());
    }

    #[test]
    fn test_missing_or_invalid_file_is_config_error() {
        let err = ConfigBuilder::new().config_file("/definitely/not/here.toml").build();
        assert!(matches!(err, Err(AppError::Config(_))));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[pipeline]\nmax_concurency = 3\n").unwrap();
        let err = ConfigBuilder::new().config_file(path.display().to_string()).build();
        assert!(matches!(err, Err(AppError::Config(_))));
    }
}
