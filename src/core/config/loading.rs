//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads configuration settings from a TOML file.
pub fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("File not found or is not a file: {}", file_path));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Applies every field present in `file_config` onto `config`.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // Network
    let network = &file_config.network;
    if let Some(timeout) = network.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(rps) = network.requests_per_second {
        config.requests_per_second = rps;
    }
    if let Some(user_agent) = non_blank(&network.user_agent) {
        config.user_agent = user_agent;
    }

    // Retry
    let retry = &file_config.retry;
    if let Some(attempts) = retry.max_attempts {
        config.max_attempts = attempts;
    }
    if let Some(ms) = retry.base_delay_ms {
        config.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = retry.max_delay_ms {
        config.max_delay = Duration::from_millis(ms);
    }

    // Pipeline
    let pipeline = &file_config.pipeline;
    if let Some(concurrency) = pipeline.max_concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(every) = pipeline.checkpoint_every {
        config.checkpoint_every = every;
    }
    if let Some(dir) = non_blank(&pipeline.checkpoint_dir) {
        config.checkpoint_dir = PathBuf::from(dir);
    }
    if let Some(key) = non_blank(&pipeline.key_field) {
        config.key_field = key;
    }
    if let Some(max) = pipeline.max_leads {
        config.max_leads = Some(max);
    }
    if let Some(skip) = pipeline.skip_first {
        config.skip_first = skip;
    }
    if let Some(include) = pipeline.include_existing {
        config.include_existing = include;
    }
    if let Some(ref fields) = pipeline.require_fields {
        config.require_fields = fields.clone();
    }
    if let Some(skip) = pipeline.skip_if_missing_required {
        config.skip_if_missing_required = skip;
    }

    // Waterfall
    let waterfall = &file_config.waterfall;
    if let Some(threshold) = waterfall.confidence_threshold {
        config.confidence_threshold = threshold;
    }
    if let Some(c) = waterfall.about_page_confidence {
        config.about_page_confidence = c;
    }
    if let Some(c) = waterfall.legal_page_confidence {
        config.legal_page_confidence = c;
    }
    if let Some(c) = waterfall.search_confidence {
        config.search_confidence = c;
    }
    if let Some(c) = waterfall.people_search_confidence {
        config.people_search_confidence = c;
    }
    if let Some(n) = waterfall.max_about_pages {
        config.max_about_pages = n;
    }
    if let Some(n) = waterfall.max_legal_pages {
        config.max_legal_pages = n;
    }

    // Services
    let services = &file_config.services;
    if let Some(url) = non_blank(&services.contacts_endpoint) {
        config.contacts_endpoint = url;
    }
    if let Some(url) = non_blank(&services.anymail_endpoint) {
        config.anymail_endpoint = url;
    }
    if let Some(ref categories) = services.decision_maker_categories {
        if !categories.is_empty() {
            config.decision_maker_categories = categories.clone();
        }
    }
    if let Some(url) = non_blank(&services.chat_endpoint) {
        config.chat_endpoint = url;
    }
    if let Some(model) = non_blank(&services.chat_model) {
        config.chat_model = model;
    }
    if let Some(url) = non_blank(&services.search_endpoint) {
        config.search_endpoint = url;
    }
    if let Some(attempts) = services.search_poll_attempts {
        config.search_poll_attempts = attempts;
    }
    if let Some(secs) = services.search_poll_interval {
        config.search_poll_interval = Duration::from_secs(secs);
    }
    if let Some(url) = non_blank(&services.people_search_endpoint) {
        config.people_search_endpoint = url;
    }
    if let Some(host) = non_blank(&services.people_search_host) {
        config.people_search_host = host;
    }
}
