//! Contains validation logic for the final Config struct.

use super::{Config, Result};
use crate::core::error::AppError;

fn clamp_unit(name: &str, value: &mut f64) -> Result<()> {
    if value.is_nan() {
        return Err(AppError::Config(format!("{} must be a number.", name)));
    }
    if !(0.0..=1.0).contains(value) {
        tracing::warn!("{} ({}) outside [0, 1]. Clamping.", name, value);
        *value = value.clamp(0.0, 1.0);
    }
    Ok(())
}

/// Validates the configuration after all layers are applied.
/// Clamps values that have an obvious nearest sensible value and rejects the rest.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    if !config.requests_per_second.is_finite() || config.requests_per_second <= 0.0 {
        return Err(AppError::Config(format!(
            "requests_per_second must be positive, got {}",
            config.requests_per_second
        )));
    }
    if config.request_timeout.is_zero() {
        return Err(AppError::Config("request_timeout must be at least 1 second.".to_string()));
    }
    if config.max_attempts == 0 {
        return Err(AppError::Config("max_attempts must be at least 1.".to_string()));
    }
    if config.base_delay > config.max_delay {
        return Err(AppError::Config(format!(
            "Retry base delay ({:?}) exceeds max delay ({:?}).",
            config.base_delay, config.max_delay
        )));
    }
    if config.max_concurrency == 0 {
        tracing::warn!("Max concurrency was set to 0. Setting to 1.");
        config.max_concurrency = 1;
    }
    if config.checkpoint_every == 0 {
        tracing::warn!("Checkpoint cadence was set to 0. Flushing after every lookup.");
        config.checkpoint_every = 1;
    }
    if config.key_field.trim().is_empty() {
        return Err(AppError::Config("key_field cannot be empty.".to_string()));
    }
    if config.max_leads == Some(0) {
        tracing::warn!("max_leads is 0; no lookups will be dispatched.");
    }

    clamp_unit("Confidence threshold", &mut config.confidence_threshold)?;
    clamp_unit("About page confidence", &mut config.about_page_confidence)?;
    clamp_unit("Legal page confidence", &mut config.legal_page_confidence)?;
    clamp_unit("Search confidence", &mut config.search_confidence)?;
    clamp_unit("People search confidence", &mut config.people_search_confidence)?;

    if config.decision_maker_categories.iter().all(|c| c.trim().is_empty()) {
        return Err(AppError::Config(
            "At least one decision maker category is required.".to_string(),
        ));
    }
    if config.search_poll_attempts == 0 {
        tracing::warn!("Search poll attempts was set to 0. Setting to 1.");
        config.search_poll_attempts = 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clamps_recoverable_values() {
        let mut config = Config {
            max_concurrency: 0,
            checkpoint_every: 0,
            confidence_threshold: 1.7,
            ..Config::default()
        };
        validate_config(&mut config).unwrap();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.checkpoint_every, 1);
        assert_eq!(config.confidence_threshold, 1.0);
    }

    #[test]
    fn test_rejects_nonsense() {
        let bad = [
            Config { requests_per_second: 0.0, ..Config::default() },
            Config { max_attempts: 0, ..Config::default() },
            Config {
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(1),
                ..Config::default()
            },
            Config { key_field: " ".into(), ..Config::default() },
            Config { confidence_threshold: f64::NAN, ..Config::default() },
        ];
        for mut config in bad {
            assert!(matches!(validate_config(&mut config), Err(AppError::Config(_))));
        }
    }
}
