//! Website contact scraping: emails, phones and social profiles for a site.

use crate::core::kind::EnrichmentKind;
use crate::core::models::{Fields, LookupResult, WorkUnit};
use crate::lookup::{HttpTransport, LookupService, RemoteResponse, RequestSpec, TransportError};

use async_trait::async_trait;
use serde_json::Value;

pub struct ContactsService {
    transport: HttpTransport,
    endpoint: String,
    api_key: String,
}

impl ContactsService {
    pub fn new(transport: HttpTransport, endpoint: String, api_key: String) -> Self {
        Self {
            transport,
            endpoint,
            api_key,
        }
    }

    fn request(&self, website: &str) -> RequestSpec {
        RequestSpec::get(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .query("query", website)
    }
}

/// Collects the non-empty `value` strings of a list like `[{"value": ".."}]`.
/// Bare strings in the list are accepted too.
fn values_of(list: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = list else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let text = match item {
            Value::Object(obj) => obj.get("value").and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        };
        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            if !out.iter().any(|seen| seen.eq_ignore_ascii_case(text)) {
                out.push(text.to_string());
            }
        }
    }
    out
}

fn insert_list(fields: &mut Fields, single: &str, plural: &str, values: Vec<String>) {
    if let Some(first) = values.first() {
        fields.insert(single.to_string(), Value::String(first.clone()));
        fields.insert(plural.to_string(), Value::from(values));
    }
}

/// Turns a scrape response into contact fields.
pub(crate) fn parse_contacts(body: &str) -> LookupResult {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return LookupResult::permanent(format!("malformed contacts body: {}", e)),
    };
    match parsed.get("status").and_then(Value::as_str) {
        Some("OK") => {}
        Some(other) => return LookupResult::not_found_with(format!("contacts status '{}'", other)),
        None => return LookupResult::permanent("contacts body has no status"),
    }
    let Some(entry) = parsed
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
    else {
        return LookupResult::not_found_with("no contact data for site");
    };

    let mut fields = Fields::new();
    insert_list(&mut fields, "email", "emails", values_of(entry.get("emails")));
    insert_list(&mut fields, "phone", "phones", values_of(entry.get("phone_numbers")));
    for platform in EnrichmentKind::social_platforms() {
        if let Some(url) = entry
            .get(*platform)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            fields.insert(format!("social_{}", platform), Value::String(url.to_string()));
        }
    }

    if fields.is_empty() {
        LookupResult::not_found()
    } else {
        LookupResult::success(fields)
    }
}

#[async_trait]
impl LookupService for ContactsService {
    fn name(&self) -> &str {
        "openwebninja"
    }

    async fn call(&self, unit: &WorkUnit) -> std::result::Result<RemoteResponse, TransportError> {
        let website = unit
            .inputs
            .website
            .as_deref()
            .ok_or_else(|| TransportError::Request("record has no website".to_string()))?;
        self.transport.send(&self.request(website)).await
    }

    fn interpret(&self, _unit: &WorkUnit, body: &str) -> LookupResult {
        parse_contacts(body)
    }
}
