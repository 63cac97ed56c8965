//! Decision-maker email lookup by company domain or name.

use crate::core::models::{Fields, LookupResult, WorkUnit};
use crate::lookup::{HttpTransport, LookupService, RemoteResponse, RequestSpec, TransportError};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct AnymailService {
    transport: HttpTransport,
    endpoint: String,
    api_key: String,
    categories: Vec<String>,
}

impl AnymailService {
    pub fn new(transport: HttpTransport, endpoint: String, api_key: String, categories: Vec<String>) -> Self {
        Self {
            transport,
            endpoint,
            api_key,
            categories,
        }
    }
}

/// Request body: the domain when known, otherwise the company name.
pub(crate) fn build_payload(unit: &WorkUnit, categories: &[String]) -> Option<Value> {
    let categories: Vec<&str> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if let Some(domain) = unit.inputs.domain.as_deref() {
        return Some(json!({ "decision_maker_category": categories, "domain": domain }));
    }
    unit.inputs
        .company_name
        .as_deref()
        .map(|name| json!({ "decision_maker_category": categories, "company_name": name }))
}

#[derive(Debug, Deserialize)]
struct FindEmailResponse {
    #[serde(default)]
    email_status: Option<String>,
    #[serde(default)]
    valid_email: Option<String>,
    #[serde(default)]
    person_full_name: Option<String>,
    #[serde(default)]
    person_job_title: Option<String>,
    #[serde(default)]
    person_linkedin_url: Option<String>,
}

fn put(fields: &mut Fields, key: &str, value: Option<String>) {
    if let Some(v) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        fields.insert(key.to_string(), Value::String(v));
    }
}

/// Only a `valid` status yields an email; any reported status is kept.
pub(crate) fn parse_response(body: &str) -> LookupResult {
    let response: FindEmailResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return LookupResult::permanent(format!("malformed find-email body: {}", e)),
    };

    let status = response
        .email_status
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut fields = Fields::new();
    if status.as_deref() == Some("valid") {
        put(&mut fields, "decision_maker_email", response.valid_email);
    }
    put(&mut fields, "decision_maker_email_status", status.clone());
    put(&mut fields, "decision_maker_name", response.person_full_name);
    put(&mut fields, "decision_maker_title", response.person_job_title);
    put(&mut fields, "decision_maker_linkedin", response.person_linkedin_url);

    match status.as_deref() {
        None | Some("not_found") if !fields.contains_key("decision_maker_name") => {
            LookupResult::not_found_with("no decision maker email")
        }
        _ => LookupResult::success(fields),
    }
}

#[async_trait]
impl LookupService for AnymailService {
    fn name(&self) -> &str {
        "anymailfinder"
    }

    async fn call(&self, unit: &WorkUnit) -> std::result::Result<RemoteResponse, TransportError> {
        let payload = build_payload(unit, &self.categories)
            .ok_or_else(|| TransportError::Request("record has neither domain nor company name".to_string()))?;
        let request = RequestSpec::post_json(&self.endpoint, payload).header("Authorization", &self.api_key);
        self.transport.send(&request).await
    }

    fn interpret(&self, _unit: &WorkUnit, body: &str) -> LookupResult {
        parse_response(body)
    }
}
