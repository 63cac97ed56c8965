//! Website liveness check. A site is live when it answers a HEAD request
//! with a 2xx (after redirects); servers that reject HEAD get a GET.

use crate::core::models::{FailureKind, Fields, LookupResult, WorkUnit};
use crate::lookup::{CallOutcome, Caller, Lookup, RequestSpec, Transport};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const WEBSITE_STATUS_FIELD: &str = "website_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus {
    Live,
    Dead,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Live => "live",
            SiteStatus::Dead => "dead",
        }
    }
}

pub struct WebsiteCheck {
    transport: Arc<dyn Transport>,
    caller: Caller,
}

impl WebsiteCheck {
    pub fn new(transport: Arc<dyn Transport>, caller: Caller) -> Self {
        Self { transport, caller }
    }

    async fn request(&self, label: &str, spec: RequestSpec) -> CallOutcome {
        let transport = &self.transport;
        let spec = &spec;
        self.caller.execute(label, move || transport.send(spec)).await
    }

    pub async fn check(&self, label: &str, website: &str) -> SiteStatus {
        match self.request(label, RequestSpec::head(website)).await {
            CallOutcome::Completed(_) => return SiteStatus::Live,
            CallOutcome::Failed {
                kind: FailureKind::Transient,
                detail,
            } => {
                tracing::debug!(target: "lookup", "[{}] Unreachable: {}", label, detail);
                return SiteStatus::Dead;
            }
            CallOutcome::NotFound(_) | CallOutcome::Failed { .. } => {}
        }
        match self.request(label, RequestSpec::get(website)).await {
            CallOutcome::Completed(_) => SiteStatus::Live,
            other => {
                tracing::debug!(target: "lookup", "[{}] GET did not succeed: {:?}", label, other);
                SiteStatus::Dead
            }
        }
    }
}

#[async_trait]
impl Lookup for WebsiteCheck {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        let Some(website) = unit.inputs.website.as_deref() else {
            return LookupResult::permanent("record has no website");
        };
        let status = self.check(&format!("website {}", unit.label()), website).await;
        let mut fields = Fields::new();
        fields.insert(WEBSITE_STATUS_FIELD.to_string(), Value::String(status.as_str().to_string()));
        LookupResult::success(fields)
    }
}
