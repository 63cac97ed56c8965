//! Service adapters: how each paid API is called and how its answers become
//! enrichment fields.

pub mod anymail;
pub mod contacts;
pub mod decision_maker;
pub mod website;

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::kind::EnrichmentKind;
use crate::lookup::{Caller, HttpTransport, Lookup, LookupClient, RateLimiter};

use std::sync::Arc;

/// API keys, typically from CLI flags backed by environment variables.
#[derive(Clone, Default)]
pub struct Credentials {
    pub contacts_api_key: Option<String>,
    pub anymail_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub search_login: Option<String>,
    pub search_password: Option<String>,
    pub people_search_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("contacts_api_key", &mask(&self.contacts_api_key))
            .field("anymail_api_key", &mask(&self.anymail_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("search_login", &mask(&self.search_login))
            .field("search_password", &mask(&self.search_password))
            .field("people_search_key", &mask(&self.people_search_key))
            .finish()
    }
}

fn required(value: &Option<String>, env_name: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::Config(format!("Missing credential: set {}", env_name))),
    }
}

impl Credentials {
    /// Fails with a configuration error when a key the kind needs is missing.
    pub fn check_for(&self, kind: EnrichmentKind) -> Result<()> {
        match kind {
            EnrichmentKind::Contacts => {
                required(&self.contacts_api_key, "OPENWEBNINJA_API_KEY")?;
            }
            EnrichmentKind::DecisionMakerEmail => {
                required(&self.anymail_api_key, "ANYMAIL_API_KEY")?;
            }
            EnrichmentKind::DecisionMaker => {
                required(&self.openai_api_key, "OPENAI_API_KEY")?;
                required(&self.search_login, "DATAFORSEO_LOGIN")?;
                required(&self.search_password, "DATAFORSEO_PASSWORD")?;
                required(&self.people_search_key, "RAPIDAPI_KEY")?;
            }
            EnrichmentKind::WebsiteCheck => {}
        }
        Ok(())
    }
}

/// Builds the lookup for `kind`. All sources share one transport and one
/// rate limiter, so the request ceiling covers every call of the run.
pub fn build_lookup(kind: EnrichmentKind, config: &Config, credentials: &Credentials) -> Result<Arc<dyn Lookup>> {
    credentials.check_for(kind)?;
    let transport = HttpTransport::new(config)?;
    let limiter = Arc::new(RateLimiter::per_second(config.requests_per_second));
    let caller = Caller::new(config.retry_policy(), config.request_timeout, limiter);

    let lookup: Arc<dyn Lookup> = match kind {
        EnrichmentKind::Contacts => {
            let service = contacts::ContactsService::new(
                transport,
                config.contacts_endpoint.clone(),
                required(&credentials.contacts_api_key, "OPENWEBNINJA_API_KEY")?,
            );
            Arc::new(LookupClient::new(service, caller))
        }
        EnrichmentKind::DecisionMakerEmail => {
            let service = anymail::AnymailService::new(
                transport,
                config.anymail_endpoint.clone(),
                required(&credentials.anymail_api_key, "ANYMAIL_API_KEY")?,
                config.decision_maker_categories.clone(),
            );
            Arc::new(LookupClient::new(service, caller))
        }
        EnrichmentKind::DecisionMaker => Arc::new(decision_maker::build_waterfall(
            config,
            credentials,
            transport,
            caller,
        )?),
        EnrichmentKind::WebsiteCheck => Arc::new(website::WebsiteCheck::new(Arc::new(transport), caller)),
    };
    tracing::info!("Lookup for '{}' initialized (max {} req/s).", kind, config.requests_per_second);
    Ok(lookup)
}
