//! Ordered fallback over several lookup sources, stopping at the first
//! result whose confidence clears a threshold.

use super::Lookup;
use crate::core::models::{Fields, LookupResult, WorkUnit};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A source's findings carry their confidence under this key.
pub const CONFIDENCE_FIELD: &str = "confidence";

pub struct WaterfallStep {
    pub name: String,
    pub lookup: Arc<dyn Lookup>,
    /// Used when the source reports no confidence of its own.
    pub default_confidence: f64,
}

impl WaterfallStep {
    pub fn new(name: impl Into<String>, lookup: Arc<dyn Lookup>, default_confidence: f64) -> Self {
        Self {
            name: name.into(),
            lookup,
            default_confidence,
        }
    }
}

/// What one step contributed.
#[derive(Debug)]
enum StepOutcome {
    Accepted { confidence: f64, fields: Fields },
    Weak { confidence: f64 },
    Miss,
    Failed(LookupResult),
}

fn read_confidence(fields: &Fields, default: f64) -> f64 {
    let parsed = match fields.get(CONFIDENCE_FIELD) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|c| c.is_finite()).unwrap_or(default)
}

pub struct Waterfall {
    steps: Vec<WaterfallStep>,
    threshold: f64,
    source_key: String,
    confidence_key: String,
}

impl Waterfall {
    pub fn new(steps: Vec<WaterfallStep>, threshold: f64) -> Self {
        Self {
            steps,
            threshold,
            source_key: "source".to_string(),
            confidence_key: CONFIDENCE_FIELD.to_string(),
        }
    }

    /// Output keys under which the winning source and its confidence are recorded.
    pub fn with_output_keys(mut self, source_key: impl Into<String>, confidence_key: impl Into<String>) -> Self {
        self.source_key = source_key.into();
        self.confidence_key = confidence_key.into();
        self
    }

    async fn run_step(&self, step: &WaterfallStep, unit: &WorkUnit) -> StepOutcome {
        match step.lookup.lookup(unit).await {
            LookupResult::Success { mut fields } => {
                let confidence = read_confidence(&fields, step.default_confidence);
                if confidence >= self.threshold {
                    fields.remove(CONFIDENCE_FIELD);
                    StepOutcome::Accepted { confidence, fields }
                } else {
                    StepOutcome::Weak { confidence }
                }
            }
            LookupResult::NotFound { .. } => StepOutcome::Miss,
            failed @ LookupResult::Failed { .. } => StepOutcome::Failed(failed),
        }
    }
}

#[async_trait]
impl Lookup for Waterfall {
    async fn lookup(&self, unit: &WorkUnit) -> LookupResult {
        let label = unit.label();
        let mut tried: Vec<String> = Vec::with_capacity(self.steps.len());
        let mut last_failure: Option<LookupResult> = None;
        let mut any_answer = false;

        for step in &self.steps {
            match self.run_step(step, unit).await {
                StepOutcome::Accepted { confidence, mut fields } => {
                    tracing::info!(target: "waterfall",
                        "[{}] Accepted result from '{}' (confidence {:.2})", label, step.name, confidence);
                    fields.insert(self.source_key.clone(), Value::String(step.name.clone()));
                    fields.insert(self.confidence_key.clone(), Value::String(format!("{}", confidence)));
                    return LookupResult::success(fields);
                }
                StepOutcome::Weak { confidence } => {
                    any_answer = true;
                    tried.push(format!("{} weak {:.2}", step.name, confidence));
                    tracing::debug!(target: "waterfall",
                        "[{}] '{}' below threshold ({:.2} < {:.2})", label, step.name, confidence, self.threshold);
                }
                StepOutcome::Miss => {
                    any_answer = true;
                    tried.push(format!("{} miss", step.name));
                    tracing::debug!(target: "waterfall", "[{}] '{}' found nothing", label, step.name);
                }
                StepOutcome::Failed(failure) => {
                    tracing::warn!(target: "waterfall", "[{}] '{}' failed: {:?}", label, step.name, failure);
                    tried.push(format!("{} failed", step.name));
                    last_failure = Some(failure);
                }
            }
        }

        // Every source failed outright: surface the failure rather than a miss.
        if !any_answer {
            if let Some(failure) = last_failure {
                return failure;
            }
        }
        if tried.is_empty() {
            return LookupResult::not_found_with("waterfall has no sources");
        }
        let detail = format!("no source cleared threshold {:.2}: {}", self.threshold, tried.join(", "));
        tracing::info!(target: "waterfall", "[{}] Not found ({})", label, detail);
        LookupResult::not_found_with(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FailureKind;
    use crate::core::testing::{fields, unit_for, FixedLookup};
    use serde_json::json;

    fn step(name: &str, result: LookupResult, default: f64) -> (WaterfallStep, Arc<FixedLookup>) {
        let lookup = Arc::new(FixedLookup::new(result));
        (WaterfallStep::new(name, lookup.clone(), default), lookup)
    }

    #[tokio::test]
    async fn test_stops_at_first_strong_result() {
        let (about, about_calls) = step("about_page", LookupResult::not_found(), 0.8);
        let (legal, legal_calls) = step(
            "terms_page",
            LookupResult::success(fields(json!({"decision_maker_name": "Ann Lee", "confidence": "0.9"}))),
            0.6,
        );
        let (search, search_calls) = step(
            "linkedin_search",
            LookupResult::success(fields(json!({"decision_maker_name": "Bob"}))),
            0.5,
        );
        let waterfall = Waterfall::new(vec![about, legal, search], 0.5)
            .with_output_keys("decision_maker_source", "decision_maker_confidence");

        let LookupResult::Success { fields } = waterfall.lookup(&unit_for("acme.com")).await else {
            panic!("expected success");
        };
        assert_eq!(fields["decision_maker_name"], json!("Ann Lee"));
        assert_eq!(fields["decision_maker_source"], json!("terms_page"));
        assert_eq!(fields["decision_maker_confidence"], json!("0.9"));
        assert!(fields.get("confidence").is_none());
        assert_eq!((about_calls.calls(), legal_calls.calls(), search_calls.calls()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_weak_results_fall_through_to_not_found() {
        let (about, _) = step(
            "about_page",
            LookupResult::success(fields(json!({"decision_maker_name": "Maybe", "confidence": 0.2}))),
            0.8,
        );
        let (search, _) = step("linkedin_search", LookupResult::not_found(), 0.5);
        let waterfall = Waterfall::new(vec![about, search], 0.5);

        let result = waterfall.lookup(&unit_for("acme.com")).await;
        let LookupResult::NotFound { detail: Some(detail) } = result else {
            panic!("expected not found with detail");
        };
        assert_eq!(detail, "no source cleared threshold 0.50: about_page weak 0.20, linkedin_search miss");
    }

    #[tokio::test]
    async fn test_default_confidence_applies_when_source_reports_none() {
        let (about, _) = step(
            "about_page",
            LookupResult::success(fields(json!({"decision_maker_name": "Ann"}))),
            0.8,
        );
        let waterfall = Waterfall::new(vec![about], 0.5);
        let LookupResult::Success { fields } = waterfall.lookup(&unit_for("acme.com")).await else {
            panic!("expected success");
        };
        assert_eq!(fields["source"], json!("about_page"));
        assert_eq!(fields["confidence"], json!("0.8"));
    }

    #[tokio::test]
    async fn test_failure_continues_and_all_failed_surfaces_failure() {
        let (about, _) = step("about_page", LookupResult::transient("HTTP 503"), 0.8);
        let (search, _) = step(
            "linkedin_search",
            LookupResult::success(fields(json!({"decision_maker_name": "Cy"}))),
            0.7,
        );
        let waterfall = Waterfall::new(vec![about, search], 0.5);
        assert!(waterfall.lookup(&unit_for("acme.com")).await.is_success());

        let (a, _) = step("about_page", LookupResult::transient("HTTP 503"), 0.8);
        let (b, _) = step("terms_page", LookupResult::permanent("HTTP 401"), 0.6);
        let failing = Waterfall::new(vec![a, b], 0.5);
        assert!(matches!(
            failing.lookup(&unit_for("acme.com")).await,
            LookupResult::Failed { kind: FailureKind::Permanent, .. }
        ));
    }
}
