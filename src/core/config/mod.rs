//! Runtime configuration: defaults, TOML file layer and builder overrides.

mod builder;
mod loading;
mod validation;

pub use builder::ConfigBuilder;
pub use loading::load_config_file;

pub(crate) use crate::core::error::Result;
use crate::lookup::RetryPolicy;

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; LeadEnrich/0.3)";

/// Fully resolved settings used by the pipeline and the service adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Network
    pub request_timeout: Duration,
    pub requests_per_second: f64,
    pub user_agent: String,

    // Retry
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,

    // Pipeline
    pub max_concurrency: usize,
    pub checkpoint_every: usize,
    pub checkpoint_dir: PathBuf,
    pub key_field: String,
    pub max_leads: Option<usize>,
    pub skip_first: usize,
    pub include_existing: bool,
    pub require_fields: Vec<String>,
    pub skip_if_missing_required: bool,

    // Waterfall
    pub confidence_threshold: f64,
    pub about_page_confidence: f64,
    pub legal_page_confidence: f64,
    pub search_confidence: f64,
    pub people_search_confidence: f64,
    pub max_about_pages: usize,
    pub max_legal_pages: usize,

    // Services
    pub contacts_endpoint: String,
    pub anymail_endpoint: String,
    pub decision_maker_categories: Vec<String>,
    pub chat_endpoint: String,
    pub chat_model: String,
    pub search_endpoint: String,
    pub search_poll_attempts: u32,
    pub search_poll_interval: Duration,
    pub people_search_endpoint: String,
    pub people_search_host: String,

    pub loaded_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(180),
            requests_per_second: 5.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),

            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),

            max_concurrency: 5,
            checkpoint_every: 10,
            checkpoint_dir: PathBuf::from(".tmp"),
            key_field: "_row_id".to_string(),
            max_leads: None,
            skip_first: 0,
            include_existing: false,
            require_fields: Vec::new(),
            skip_if_missing_required: true,

            confidence_threshold: 0.5,
            about_page_confidence: 0.8,
            legal_page_confidence: 0.6,
            search_confidence: 0.7,
            people_search_confidence: 0.6,
            max_about_pages: 3,
            max_legal_pages: 2,

            contacts_endpoint: "https://api.openwebninja.com/website-contacts-scraper/scrape-contacts"
                .to_string(),
            anymail_endpoint: "https://api.anymailfinder.com/v5.1/find-email/decision-maker".to_string(),
            decision_maker_categories: vec!["ceo".to_string()],
            chat_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            chat_model: "gpt-4.1-mini".to_string(),
            search_endpoint: "https://api.dataforseo.com/v3/serp/google/organic".to_string(),
            search_poll_attempts: 10,
            search_poll_interval: Duration::from_secs(2),
            people_search_endpoint: "https://li-data-scraper.p.rapidapi.com/search-people".to_string(),
            people_search_host: "li-data-scraper.p.rapidapi.com".to_string(),

            loaded_config_path: None,
        }
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
        }
    }
}

/// On-disk TOML layout. Every field is optional; absent fields keep the
/// value from the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub network: NetworkSection,
    pub retry: RetrySection,
    pub pipeline: PipelineSection,
    pub waterfall: WaterfallSection,
    pub services: ServicesSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    /// Seconds.
    pub request_timeout: Option<u64>,
    pub requests_per_second: Option<f64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub max_concurrency: Option<usize>,
    pub checkpoint_every: Option<usize>,
    pub checkpoint_dir: Option<String>,
    pub key_field: Option<String>,
    pub max_leads: Option<usize>,
    pub skip_first: Option<usize>,
    pub include_existing: Option<bool>,
    pub require_fields: Option<Vec<String>>,
    pub skip_if_missing_required: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaterfallSection {
    pub confidence_threshold: Option<f64>,
    pub about_page_confidence: Option<f64>,
    pub legal_page_confidence: Option<f64>,
    pub search_confidence: Option<f64>,
    pub people_search_confidence: Option<f64>,
    pub max_about_pages: Option<usize>,
    pub max_legal_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesSection {
    pub contacts_endpoint: Option<String>,
    pub anymail_endpoint: Option<String>,
    pub decision_maker_categories: Option<Vec<String>>,
    pub chat_endpoint: Option<String>,
    pub chat_model: Option<String>,
    pub search_endpoint: Option<String>,
    pub search_poll_attempts: Option<u32>,
    /// Seconds.
    pub search_poll_interval: Option<u64>,
    pub people_search_endpoint: Option<String>,
    pub people_search_host: Option<String>,
}
